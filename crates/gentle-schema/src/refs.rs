//! # Reference Resolution
//!
//! A `$ref` name is resolved against three sources, in order:
//!
//! 1. the external registry (`add_ref`, `override_ref`, the `refs` option)
//! 2. the schema's local `$defs`
//! 3. a path lookup into the raw schema definition (`node`,
//!    `node.properties.children.items`), which is what lets a shape refer
//!    to itself
//!
//! Resolution follows `$ref` chains and detects cycles. Failures never
//! abort: they compile to a checker that reports one error on the field
//! being validated. Compiled checkers are cached per name; any registry
//! mutation clears the whole cache.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use gentle_core::{ErrorCode, ErrorEntry};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::checker::Checker;
use crate::descriptor::{Descriptor, FieldDescriptor};
use crate::error::SchemaError;
use crate::normalize::normalize;
use crate::raw::{RawDef, SchemaDef};

/// Where a reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOrigin {
    External,
    LocalDefs,
    Path,
}

impl RefOrigin {
    fn label(self) -> &'static str {
        match self {
            Self::External => "external ref",
            Self::LocalDefs => "local $defs ref",
            Self::Path => "path-ref",
        }
    }
}

/// A reference that could not be turned into a usable descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct RefFailure {
    pub code: ErrorCode,
    pub reason: String,
    pub raw: Option<String>,
}

impl RefFailure {
    fn unresolved(name: &str) -> Self {
        Self {
            code: ErrorCode::RefUnresolved,
            reason: format!("unresolved ref '{name}'"),
            raw: None,
        }
    }

    fn circular(name: &str) -> Self {
        Self {
            code: ErrorCode::RefUnresolved,
            reason: format!("circular ref '{name}'"),
            raw: None,
        }
    }

    fn normalize(origin: RefOrigin, name: &str, err: &SchemaError) -> Self {
        let detail = match err.issues() {
            [] => err.to_string(),
            issues => issues
                .iter()
                .map(|issue| issue.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        };
        Self {
            code: ErrorCode::RefNormalize,
            reason: format!("failed to normalize {} '{name}': {detail}", origin.label()),
            raw: Some(err.to_string()),
        }
    }

    /// The error entry reported at `path`.
    pub fn entry(&self, path: &str) -> ErrorEntry {
        let entry = ErrorEntry::new(path, &self.reason, self.code);
        match &self.raw {
            Some(raw) => entry.with_raw(raw.clone()),
            None => entry,
        }
    }
}

impl fmt::Display for RefFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.reason)
    }
}

/// What checkers and the fragment merger need from a reference table.
pub(crate) trait RefSource {
    /// Compiled checker for `name`. Never fails: failures compile to a
    /// checker that reports them.
    fn checker(&self, name: &str) -> Arc<Checker>;

    /// Fully resolved descriptor for `name`, following `$ref` chains.
    fn descriptor(&self, name: &str) -> Result<FieldDescriptor, RefFailure>;
}

/// External registry plus the resolved-checker cache for one schema.
#[derive(Debug)]
pub(crate) struct RefResolver {
    registry: BTreeMap<String, RawDef>,
    schema: Arc<SchemaDef>,
    max_regex_length: usize,
    cache: RwLock<HashMap<String, Arc<Checker>>>,
}

impl RefResolver {
    pub(crate) fn new(
        registry: BTreeMap<String, RawDef>,
        schema: Arc<SchemaDef>,
        max_regex_length: usize,
    ) -> Self {
        Self {
            registry,
            schema,
            max_regex_length,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn registry(&self) -> &BTreeMap<String, RawDef> {
        &self.registry
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub(crate) fn insert(&mut self, name: String, def: RawDef) {
        self.registry.insert(name, def);
        self.clear_cache();
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let had = self.registry.remove(name).is_some();
        self.clear_cache();
        had
    }

    pub(crate) fn set_max_regex_length(&mut self, max: usize) {
        self.max_regex_length = max;
        self.clear_cache();
    }

    pub(crate) fn clear_cache(&self) {
        let mut cache = self.cache.write();
        if !cache.is_empty() {
            debug!(entries = cache.len(), "clearing ref checker cache");
            cache.clear();
        }
    }

    /// Normalize the definition `name` names, one level deep.
    pub(crate) fn resolve_ref(&self, name: &str) -> Option<Descriptor> {
        let (raw, _) = self.find_raw(name)?;
        normalize(&raw, self.max_regex_length).ok()
    }

    fn find_raw(&self, name: &str) -> Option<(RawDef, RefOrigin)> {
        if let Some(def) = self.registry.get(name) {
            return Some((def.clone(), RefOrigin::External));
        }
        if let Some(def) = self.schema.get_def(name) {
            return Some((def.clone(), RefOrigin::LocalDefs));
        }
        self.schema.lookup(name).map(|def| (def, RefOrigin::Path))
    }

    fn resolve(&self, name: &str) -> Result<FieldDescriptor, RefFailure> {
        let mut visited: Vec<String> = Vec::new();
        let mut current = name.to_string();
        loop {
            if visited.contains(&current) {
                warn!(reference = %name, chain = ?visited, "circular ref");
                return Err(RefFailure::circular(name));
            }
            let Some((raw, origin)) = self.find_raw(&current) else {
                warn!(reference = %current, "unresolved ref");
                return Err(RefFailure::unresolved(&current));
            };
            let descriptor = normalize(&raw, self.max_regex_length).map_err(|e| {
                warn!(reference = %current, error = %e, "ref failed to normalize");
                RefFailure::normalize(origin, &current, &e)
            })?;
            visited.push(current);
            match descriptor {
                Descriptor::Field(field) => return Ok(field),
                Descriptor::Ref(next) => current = next,
            }
        }
    }
}

impl RefSource for RefResolver {
    fn checker(&self, name: &str) -> Arc<Checker> {
        if let Some(hit) = self.cache.read().get(name) {
            return Arc::clone(hit);
        }
        let checker = match self.resolve(name) {
            Ok(field) => Checker::compile(&Descriptor::Field(field)),
            Err(failure) => Checker::Broken(failure),
        };
        debug!(reference = %name, "compiled ref checker");
        let checker = Arc::new(checker);
        self.cache
            .write()
            .entry(name.to_string())
            .or_insert(checker)
            .clone()
    }

    fn descriptor(&self, name: &str) -> Result<FieldDescriptor, RefFailure> {
        self.resolve(name)
    }
}

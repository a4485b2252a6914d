//! # Schema Engine
//!
//! [`Schema`] is a compiled schema instance. Construction normalizes every
//! top-level field and compiles its checker once; a validation call then:
//!
//! 1. evaluates the registered conditional rules against the whole input
//! 2. runs each declared field's checker, or an override checker built from
//!    `merge(base, fragment..)` when rules matched that field
//! 3. applies the unknown-key policy to the top-level keys
//! 4. prunes empty values when `removeEmpty` is set
//!
//! A field that produced errors is left out of the normalized value.
//!
//! ## Entry Points
//!
//! | Call           | Returns                                    |
//! |----------------|--------------------------------------------|
//! | `validate`     | result record, or the bare value (`valueOnly`) |
//! | `enforce`      | the value, or a raised [`ValidationError`] |
//! | `sanitize`     | value plus errors, never raises for invalid input |
//! | `check`        | `bool`, forced fail-fast                   |
//! | `assert_types` | result record, custom validators skipped   |
//!
//! Each has a `_with` variant taking a [`CallOptions`] overlay.
//!
//! ## Caches
//!
//! Ref checkers are cached per name and cleared on any registry or option
//! change. Override checkers are cached per `(field, matching rule
//! indices)` and cleared on any rule, registry, or option change.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use gentle_core::path::key_path;
use gentle_core::{ErrorCode, ErrorEntry, Object, Value};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::checker::{CheckCtx, CheckMode, Checker};
use crate::conditional::{self, ConditionalRule, Expectation, Subject, When};
use crate::descriptor::Descriptor;
use crate::error::{Error, Issues, SchemaError, ValidationError};
use crate::merge::merge;
use crate::normalize::Normalizer;
use crate::options::{CallOptions, SchemaOptions};
use crate::raw::{RawDef, SchemaDef};
use crate::refs::RefResolver;
use crate::stats::{FieldStats, StatsTable};

/// Outcome of one validation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ErrorEntry>,
    pub value: Value,
}

/// What [`Schema::validate`] returns: the record, or the bare value when
/// `valueOnly` is set.
#[derive(Debug, Clone, PartialEq)]
pub enum Validated {
    Report(ValidationResult),
    Value(Value),
}

impl Validated {
    pub fn value(&self) -> &Value {
        match self {
            Self::Report(report) => &report.value,
            Self::Value(value) => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Report(report) => report.value,
            Self::Value(value) => value,
        }
    }

    pub fn report(&self) -> Option<&ValidationResult> {
        match self {
            Self::Report(report) => Some(report),
            Self::Value(_) => None,
        }
    }

    pub fn into_report(self) -> Option<ValidationResult> {
        match self {
            Self::Report(report) => Some(report),
            Self::Value(_) => None,
        }
    }
}

/// What [`Schema::sanitize`] returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sanitized {
    pub value: Value,
    pub errors: Vec<ErrorEntry>,
}

impl Sanitized {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug)]
struct FieldSlot {
    name: String,
    descriptor: Descriptor,
    checker: Arc<Checker>,
}

type OverrideKey = (String, Vec<usize>);

/// A compiled schema.
#[derive(Debug)]
pub struct Schema {
    options: SchemaOptions,
    definition: Arc<SchemaDef>,
    fields: Vec<FieldSlot>,
    resolver: RefResolver,
    conditionals: Vec<ConditionalRule>,
    overrides: RwLock<HashMap<OverrideKey, Arc<Checker>>>,
    stats: StatsTable,
}

impl Schema {
    /// Compile `definition`. Lint issues across all fields are reported
    /// together as one [`SchemaError::Definition`]; an oversize or
    /// malformed regex string aborts immediately.
    ///
    /// `options.refs` seeds the external registry.
    pub fn new(definition: SchemaDef, mut options: SchemaOptions) -> Result<Self, SchemaError> {
        let registry = mem::take(&mut options.refs);
        Self::build(Arc::new(definition), options, registry)
    }

    /// Compile a JSON schema document.
    pub fn from_json(
        definition: serde_json::Value,
        options: SchemaOptions,
    ) -> Result<Self, SchemaError> {
        Self::new(SchemaDef::try_from(definition)?, options)
    }

    /// Compile a YAML schema document.
    pub fn from_yaml_str(definition: &str, options: SchemaOptions) -> Result<Self, SchemaError> {
        Self::new(SchemaDef::from_yaml_str(definition)?, options)
    }

    fn build(
        definition: Arc<SchemaDef>,
        options: SchemaOptions,
        registry: BTreeMap<String, RawDef>,
    ) -> Result<Self, SchemaError> {
        let mut normalizer = Normalizer::new(options.max_regex_length);
        let mut fields = Vec::with_capacity(definition.fields().len());
        for (name, raw) in definition.fields() {
            let descriptor = normalizer.normalize(raw, name, name)?;
            let checker = Arc::new(Checker::compile(&descriptor));
            fields.push(FieldSlot {
                name: name.clone(),
                descriptor,
                checker,
            });
        }
        let issues = normalizer.take_issues();
        if !issues.is_empty() {
            return Err(SchemaError::Definition(Issues(issues)));
        }

        debug!(
            fields = fields.len(),
            defs = definition.defs().len(),
            refs = registry.len(),
            "schema compiled"
        );
        let resolver = RefResolver::new(registry, Arc::clone(&definition), options.max_regex_length);
        Ok(Self {
            options,
            definition,
            fields,
            resolver,
            conditionals: Vec::new(),
            overrides: RwLock::new(HashMap::new()),
            stats: StatsTable::default(),
        })
    }

    // ---- validation entry points ----

    pub fn validate(&self, input: &Value) -> Result<Validated, Error> {
        self.validate_with(input, &CallOptions::default())
    }

    pub fn validate_with(&self, input: &Value, call: &CallOptions) -> Result<Validated, Error> {
        let options = self.options.overlay(call);
        let result = self.execute(input, &options, CheckMode::Full)?;
        Ok(if options.value_only {
            Validated::Value(result.value)
        } else {
            Validated::Report(result)
        })
    }

    /// The normalized value, or the errors raised as a [`ValidationError`].
    pub fn enforce(&self, input: &Value) -> Result<Value, Error> {
        self.enforce_with(input, &CallOptions::default())
    }

    pub fn enforce_with(&self, input: &Value, call: &CallOptions) -> Result<Value, Error> {
        self.enforce_under(input, &self.options.overlay(call))
    }

    /// Value and errors, whether the input is valid or not. Raised
    /// validation failures (`throw` fields, fail-fast under `valueOnly`)
    /// are folded into the result.
    pub fn sanitize(&self, input: &Value) -> Result<Sanitized, Error> {
        self.sanitize_with(input, &CallOptions::default())
    }

    pub fn sanitize_with(&self, input: &Value, call: &CallOptions) -> Result<Sanitized, Error> {
        self.sanitize_under(input, &self.options.overlay(call))
    }

    /// Whether the input is valid. Runs fail-fast.
    pub fn check(&self, input: &Value) -> Result<bool, Error> {
        self.check_with(input, &CallOptions::default())
    }

    pub fn check_with(&self, input: &Value, call: &CallOptions) -> Result<bool, Error> {
        self.check_under(input, &self.options.overlay(call))
    }

    /// Structure and type checks only; custom validators do not run and
    /// `removeEmpty` is not applied.
    pub fn assert_types(&self, input: &Value) -> Result<ValidationResult, Error> {
        self.assert_types_with(input, &CallOptions::default())
    }

    pub fn assert_types_with(
        &self,
        input: &Value,
        call: &CallOptions,
    ) -> Result<ValidationResult, Error> {
        self.assert_types_under(input, &self.options.overlay(call))
    }

    pub(crate) fn validate_under(
        &self,
        input: &Value,
        options: &SchemaOptions,
    ) -> Result<ValidationResult, Error> {
        self.execute(input, options, CheckMode::Full)
    }

    pub(crate) fn enforce_under(&self, input: &Value, options: &SchemaOptions) -> Result<Value, Error> {
        let result = self.execute(input, options, CheckMode::Full)?;
        if result.valid {
            return Ok(result.value);
        }
        Err(ValidationError::new(result.errors, Some(result.value)).into())
    }

    pub(crate) fn sanitize_under(
        &self,
        input: &Value,
        options: &SchemaOptions,
    ) -> Result<Sanitized, Error> {
        match self.execute(input, options, CheckMode::Full) {
            Ok(result) => Ok(Sanitized {
                value: result.value,
                errors: result.errors,
            }),
            Err(Error::Validation(raised)) => Ok(Sanitized {
                value: raised
                    .partial_value
                    .unwrap_or_else(|| Value::Object(Object::new())),
                errors: raised.errors,
            }),
            Err(other) => Err(other),
        }
    }

    pub(crate) fn check_under(&self, input: &Value, options: &SchemaOptions) -> Result<bool, Error> {
        let options = SchemaOptions {
            fail_fast: true,
            ..options.clone()
        };
        match self.execute(input, &options, CheckMode::Full) {
            Ok(result) => Ok(result.valid),
            Err(Error::Validation(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    pub(crate) fn assert_types_under(
        &self,
        input: &Value,
        options: &SchemaOptions,
    ) -> Result<ValidationResult, Error> {
        let options = SchemaOptions {
            value_only: false,
            ..options.clone()
        };
        self.execute(input, &options, CheckMode::TypesOnly)
    }

    fn execute(
        &self,
        input: &Value,
        options: &SchemaOptions,
        mode: CheckMode,
    ) -> Result<ValidationResult, Error> {
        let Value::Object(map) = input else {
            return Err(Error::InvalidInput(input.kind_name()));
        };
        let ctx = CheckCtx {
            options,
            refs: &self.resolver,
            mode,
        };
        let overrides = conditional::evaluate(&self.conditionals, input);
        let prefix = options.path_prefix.as_deref().unwrap_or("");

        let mut errors = Vec::new();
        let mut out = Object::new();

        for slot in &self.fields {
            let checker = match overrides.get(&slot.name) {
                Some(rules) => self.override_checker(slot, rules),
                None => Arc::clone(&slot.checker),
            };
            let path = key_path(prefix, &slot.name);
            let started = Instant::now();
            let checked = checker.check(map.get(&slot.name), &path, &ctx);
            if mode == CheckMode::Full {
                self.stats.record(&slot.name, started.elapsed());
            }
            let checked = checked?;
            if checked.is_valid() {
                if let Some(value) = checked.value {
                    out.insert(slot.name.clone(), value);
                }
                continue;
            }
            errors.extend(checked.errors);
            if options.fail_fast {
                return abort(errors, out, options);
            }
        }

        for (key, value) in map {
            if self.slot(key).is_some() || options.remove_unknown {
                continue;
            }
            if !options.strict {
                out.insert(key.clone(), value.clone());
                continue;
            }
            errors.push(ErrorEntry::new(
                key_path(prefix, key),
                "unknown field",
                ErrorCode::Unknown,
            ));
            if options.fail_fast {
                return abort(errors, out, options);
            }
        }

        if options.remove_empty && mode == CheckMode::Full {
            out = out
                .into_iter()
                .filter_map(|(k, v)| prune(v, options.nullable).map(|v| (k, v)))
                .collect();
        }

        Ok(ValidationResult {
            valid: errors.is_empty(),
            errors,
            value: Value::Object(out),
        })
    }

    fn slot(&self, name: &str) -> Option<&FieldSlot> {
        self.fields.iter().find(|slot| slot.name == name)
    }

    fn override_checker(&self, slot: &FieldSlot, rules: &[usize]) -> Arc<Checker> {
        let key = (slot.name.clone(), rules.to_vec());
        if let Some(hit) = self.overrides.read().get(&key) {
            return Arc::clone(hit);
        }
        let merged = rules
            .iter()
            .filter_map(|&index| self.conditionals.get(index)?.fragment_for(&slot.name))
            .try_fold(slot.descriptor.clone(), |base, fragment| {
                merge(&base, fragment, &self.resolver)
            });
        let checker = match merged {
            Ok(descriptor) => Checker::compile(&descriptor),
            Err(failure) => Checker::Broken(failure),
        };
        debug!(field = %slot.name, rules = ?rules, "compiled override checker");
        self.overrides
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(checker))
            .clone()
    }

    fn clear_overrides(&self) {
        let mut cache = self.overrides.write();
        if !cache.is_empty() {
            debug!(entries = cache.len(), "clearing override checker cache");
            cache.clear();
        }
    }

    // ---- conditionals ----

    /// Start a conditional rule on a path or whole-input predicate.
    ///
    /// ```ignore
    /// schema.when("kind").is("small").then(SchemaDef::new().field("payload", RawDef::reference("small")))?;
    /// ```
    pub fn when(&mut self, subject: impl Into<Subject>) -> When<'_> {
        When::new(self, subject.into())
    }

    pub(crate) fn push_conditional(
        &mut self,
        subject: Subject,
        expect: Expectation,
        fragment: &SchemaDef,
    ) -> Result<(), SchemaError> {
        let mut normalizer = Normalizer::new(self.options.max_regex_length);
        let fragment = fragment
            .fields()
            .iter()
            .map(|(name, raw)| Ok((name.clone(), normalizer.normalize(raw, name, name)?)))
            .collect::<Result<Vec<_>, SchemaError>>()?;
        let issues = normalizer.take_issues();
        if !issues.is_empty() {
            return Err(SchemaError::Definition(Issues(issues)));
        }
        self.conditionals.push(ConditionalRule {
            subject,
            expect,
            fragment,
        });
        self.clear_overrides();
        Ok(())
    }

    // ---- reference registry ----

    /// Register an external reference. Fails if the name is taken.
    pub fn add_ref(&mut self, name: &str, def: impl Into<RawDef>) -> Result<&mut Self, SchemaError> {
        require_ref_name(name)?;
        if self.resolver.contains(name) {
            return Err(SchemaError::DuplicateRefs(vec![name.to_string()]));
        }
        self.resolver.insert(name.to_string(), def.into());
        self.clear_overrides();
        Ok(self)
    }

    /// Register several references. Every name is checked before any is
    /// inserted; all taken names are reported together.
    pub fn add_refs<I, K, D>(&mut self, refs: I) -> Result<&mut Self, SchemaError>
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<RawDef>,
    {
        let refs: Vec<(String, RawDef)> = refs
            .into_iter()
            .map(|(name, def)| (name.into(), def.into()))
            .collect();
        for (name, _) in &refs {
            require_ref_name(name)?;
        }
        let taken: Vec<String> = refs
            .iter()
            .filter(|(name, _)| self.resolver.contains(name))
            .map(|(name, _)| name.clone())
            .collect();
        if !taken.is_empty() {
            return Err(SchemaError::DuplicateRefs(taken));
        }
        for (name, def) in refs {
            self.resolver.insert(name, def);
        }
        self.clear_overrides();
        Ok(self)
    }

    /// Register or replace a reference.
    pub fn override_ref(
        &mut self,
        name: &str,
        def: impl Into<RawDef>,
    ) -> Result<&mut Self, SchemaError> {
        require_ref_name(name)?;
        self.resolver.insert(name.to_string(), def.into());
        self.clear_overrides();
        Ok(self)
    }

    /// Whether a registered reference was removed.
    pub fn remove_ref(&mut self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let removed = self.resolver.remove(name);
        self.clear_overrides();
        removed
    }

    /// The normalized descriptor `name` resolves to, one level deep.
    pub fn resolve_ref(&self, name: &str) -> Option<Descriptor> {
        if name.is_empty() {
            return None;
        }
        self.resolver.resolve_ref(name)
    }

    /// Names in the external registry.
    pub fn ref_names(&self) -> impl Iterator<Item = &str> {
        self.resolver.registry().keys().map(String::as_str)
    }

    // ---- lifecycle ----

    /// An independent schema over the same definition with merged options.
    /// External refs and conditional rules are copied; caches and stats
    /// start empty.
    pub fn with_options(&self, patch: &CallOptions) -> Result<Schema, SchemaError> {
        let options = self.options.overlay(patch);
        let mut schema = Self::build(
            Arc::clone(&self.definition),
            options,
            self.resolver.registry().clone(),
        )?;
        schema.conditionals = self.conditionals.clone();
        Ok(schema)
    }

    /// Merge options in place. Both checker caches are cleared.
    pub fn update_options(&mut self, patch: &CallOptions) -> &mut Self {
        self.options = self.options.overlay(patch);
        self.resolver
            .set_max_regex_length(self.options.max_regex_length);
        self.clear_overrides();
        self
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Declared top-level fields, in schema order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|slot| slot.name.as_str())
    }

    pub fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.slot(name).map(|slot| &slot.descriptor)
    }

    pub fn definition(&self) -> &SchemaDef {
        &self.definition
    }

    // ---- diagnostics ----

    /// Per-field run counts and timings since construction or the last reset.
    pub fn stats(&self) -> BTreeMap<String, FieldStats> {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

fn require_ref_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::InvalidArgument(
            "ref name must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

fn abort(
    errors: Vec<ErrorEntry>,
    partial: Object,
    options: &SchemaOptions,
) -> Result<ValidationResult, Error> {
    let value = Value::Object(partial);
    if options.value_only {
        return Err(ValidationError::new(errors, Some(value)).into());
    }
    Ok(ValidationResult {
        valid: false,
        errors,
        value,
    })
}

/// Drop empty strings, sequences and structures (and nulls unless
/// `keep_null`), bottom up.
fn prune(value: Value, keep_null: bool) -> Option<Value> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::Null if !keep_null => None,
        Value::Array(items) => {
            let kept: Vec<Value> = items
                .into_iter()
                .filter_map(|item| prune(item, keep_null))
                .collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::Object(map) => {
            let kept: Object = map
                .into_iter()
                .filter_map(|(k, v)| prune(v, keep_null).map(|v| (k, v)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        other => Some(other),
    }
}

//! # Options
//!
//! [`SchemaOptions`] is the instance configuration; [`CallOptions`] is a
//! per-call overlay in which every option is optional. The effective
//! options for one call are `instance.overlay(call)`.
//!
//! Both deserialize from camelCase documents (JSON or YAML). Keys that are
//! not recognized options are kept in `extra` and handed verbatim to
//! custom validators through their context.

use std::collections::BTreeMap;

use gentle_core::Value;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SchemaError;
use crate::raw::RawDef;

/// Default ceiling on the length of a pattern given as a string.
pub const DEFAULT_MAX_REGEX_LENGTH: usize = 1000;

/// Instance-wide configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaOptions {
    /// Abort the call on the first field error.
    pub fail_fast: bool,
    /// Drop keys the schema does not declare. Takes precedence over `strict`.
    pub remove_unknown: bool,
    /// Report keys the schema does not declare as `ERR_UNKNOWN`.
    pub strict: bool,
    /// Return the bare normalized value instead of a result record.
    pub value_only: bool,
    /// Coerce every typed field unless the field says otherwise.
    pub coerce_types: bool,
    /// Prune empty strings, sequences and structures from the output.
    pub remove_empty: bool,
    /// Default nullability for fields that do not declare it.
    pub nullable: bool,
    /// Ignore predicate members of `enum` lists.
    pub strict_enum: bool,
    pub max_regex_length: usize,
    /// Prefix prepended to every reported top-level path.
    pub path_prefix: Option<String>,
    /// Seed for the external reference registry. Moved into the registry
    /// at construction; always empty on a built schema's options.
    #[serde(deserialize_with = "deserialize_refs")]
    pub refs: BTreeMap<String, RawDef>,
    /// Caller-defined options, forwarded to validators.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            remove_unknown: false,
            strict: false,
            value_only: false,
            coerce_types: false,
            remove_empty: false,
            nullable: false,
            strict_enum: false,
            max_regex_length: DEFAULT_MAX_REGEX_LENGTH,
            path_prefix: None,
            refs: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl SchemaOptions {
    /// Load options from a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text).map_err(|e| SchemaError::Config(format!("options: {e}")))
    }

    /// Load options from a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(text).map_err(|e| SchemaError::Config(format!("options: {e}")))
    }

    /// Seed one external reference.
    pub fn with_ref(mut self, name: impl Into<String>, def: impl Into<RawDef>) -> Self {
        self.refs.insert(name.into(), def.into());
        self
    }

    /// Effective options for one call.
    pub fn overlay(&self, call: &CallOptions) -> SchemaOptions {
        let mut out = SchemaOptions {
            fail_fast: call.fail_fast.unwrap_or(self.fail_fast),
            remove_unknown: call.remove_unknown.unwrap_or(self.remove_unknown),
            strict: call.strict.unwrap_or(self.strict),
            value_only: call.value_only.unwrap_or(self.value_only),
            coerce_types: call.coerce_types.unwrap_or(self.coerce_types),
            remove_empty: call.remove_empty.unwrap_or(self.remove_empty),
            nullable: call.nullable.unwrap_or(self.nullable),
            strict_enum: call.strict_enum.unwrap_or(self.strict_enum),
            max_regex_length: call.max_regex_length.unwrap_or(self.max_regex_length),
            path_prefix: call.path_prefix.clone().or_else(|| self.path_prefix.clone()),
            refs: BTreeMap::new(),
            extra: self.extra.clone(),
        };
        out.extra
            .extend(call.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}

/// Per-call overlay. `None` keeps the instance setting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_unknown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coerce_types: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_empty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_enum: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_regex_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_fast(mut self, on: bool) -> Self {
        self.fail_fast = Some(on);
        self
    }

    pub fn remove_unknown(mut self, on: bool) -> Self {
        self.remove_unknown = Some(on);
        self
    }

    pub fn strict(mut self, on: bool) -> Self {
        self.strict = Some(on);
        self
    }

    pub fn value_only(mut self, on: bool) -> Self {
        self.value_only = Some(on);
        self
    }

    pub fn coerce_types(mut self, on: bool) -> Self {
        self.coerce_types = Some(on);
        self
    }

    pub fn remove_empty(mut self, on: bool) -> Self {
        self.remove_empty = Some(on);
        self
    }

    pub fn nullable(mut self, on: bool) -> Self {
        self.nullable = Some(on);
        self
    }

    pub fn strict_enum(mut self, on: bool) -> Self {
        self.strict_enum = Some(on);
        self
    }

    pub fn max_regex_length(mut self, max: usize) -> Self {
        self.max_regex_length = Some(max);
        self
    }

    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

// ---- refs: map or array of maps ----

#[derive(Deserialize)]
#[serde(untagged)]
enum RefsDocument {
    One(BTreeMap<String, serde_json::Value>),
    Many(Vec<BTreeMap<String, serde_json::Value>>),
}

fn deserialize_refs<'de, D>(deserializer: D) -> Result<BTreeMap<String, RawDef>, D::Error>
where
    D: Deserializer<'de>,
{
    let doc = Option::<RefsDocument>::deserialize(deserializer).map_err(|_| {
        serde::de::Error::custom("refs must be an object map or array of maps")
    })?;
    let maps = match doc {
        None => Vec::new(),
        Some(RefsDocument::One(map)) => vec![map],
        Some(RefsDocument::Many(maps)) => maps,
    };
    Ok(maps
        .into_iter()
        .flatten()
        .map(|(name, def)| (name, RawDef::from(def)))
        .collect())
}

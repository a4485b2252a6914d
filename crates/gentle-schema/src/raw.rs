//! # Raw Definitions
//!
//! The shorthand forms a caller may use to declare a field, before
//! normalization:
//!
//! | Form | Meaning |
//! |------|---------|
//! | [`RawDef::TypeName`] | `"string"`, `"number"`, ... |
//! | [`RawDef::Type`] | a tag or a host [`ExternalType`] |
//! | [`RawDef::Validator`] | a bare validator, no other rules |
//! | [`RawDef::Pair`] | `[typeOrEntry, overrides]` |
//! | [`RawDef::Entry`] | a full descriptor object, or a `$ref` placeholder |
//! | [`RawDef::Shared`] | a definition reused in several places, normalized once |
//! | [`RawDef::Literal`] | any other value; normalizes to an empty descriptor |
//!
//! A [`SchemaDef`] is the ordered set of top-level fields plus the local
//! `$defs` table. Definitions can be built programmatically or loaded from
//! JSON/YAML documents.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gentle_core::path::{self, Segment};
use gentle_core::{ExternalType, Object, Pattern, TypeSpec, TypeTag, Value};

use crate::descriptor::EnumMember;
use crate::error::SchemaError;
use crate::validator::{Producer, Validator};

/// One un-normalized field definition.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDef {
    TypeName(String),
    Type(TypeSpec),
    Validator(Validator),
    Pair(Box<RawDef>, RawEntry),
    Entry(RawEntry),
    Shared(SharedDef),
    Literal(Value),
}

impl RawDef {
    /// `[def, overrides]` shorthand.
    pub fn pair(def: impl Into<RawDef>, overrides: RawEntry) -> Self {
        Self::Pair(Box::new(def.into()), overrides)
    }

    /// `{ "$ref": name }` placeholder.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Entry(RawEntry::new().reference(name))
    }
}

impl From<&str> for RawDef {
    fn from(name: &str) -> Self {
        Self::TypeName(name.to_string())
    }
}

impl From<String> for RawDef {
    fn from(name: String) -> Self {
        Self::TypeName(name)
    }
}

impl From<TypeTag> for RawDef {
    fn from(tag: TypeTag) -> Self {
        Self::Type(TypeSpec::Tag(tag))
    }
}

impl From<TypeSpec> for RawDef {
    fn from(spec: TypeSpec) -> Self {
        Self::Type(spec)
    }
}

impl From<ExternalType> for RawDef {
    fn from(ext: ExternalType) -> Self {
        Self::Type(TypeSpec::External(ext))
    }
}

impl From<Validator> for RawDef {
    fn from(v: Validator) -> Self {
        Self::Validator(v)
    }
}

impl From<RawEntry> for RawDef {
    fn from(entry: RawEntry) -> Self {
        Self::Entry(entry)
    }
}

impl From<SharedDef> for RawDef {
    fn from(shared: SharedDef) -> Self {
        Self::Shared(shared)
    }
}

impl From<Value> for RawDef {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => Self::TypeName(name),
            Value::Array(mut items) => {
                if items.is_empty() {
                    return Self::Literal(Value::Array(items));
                }
                let overrides = match items.get(1) {
                    Some(Value::Object(map)) => RawEntry::from_object(map.clone()),
                    _ => RawEntry::new(),
                };
                let first = items.swap_remove(0);
                Self::Pair(Box::new(RawDef::from(first)), overrides)
            }
            Value::Object(map) => Self::Entry(RawEntry::from_object(map)),
            other => Self::Literal(other),
        }
    }
}

impl From<serde_json::Value> for RawDef {
    fn from(json: serde_json::Value) -> Self {
        RawDef::from(Value::from(json))
    }
}

// ---- Entries ----

/// One attribute slot of a [`RawEntry`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawAttr {
    /// Plain data: flags, bounds, literal defaults, metadata, or any slot
    /// loaded from a document.
    Value(Value),
    Type(TypeSpec),
    Validator(Validator),
    Producer(Producer),
    Enum(Vec<EnumMember>),
    Pattern(Pattern),
    Def(Box<RawDef>),
    Properties(Vec<(String, RawDef)>),
}

/// A full descriptor object: ordered `(key, attribute)` pairs.
///
/// Recognized keys are `type`, `required`, `nullable`, `default`,
/// `validator`, `coerce`, `strictType`/`forceType`, `throw`, `enum`,
/// `regex`, `min`, `max`, `items`, `properties`, `errorMessage` and
/// `$ref`. Any other key is caller metadata and is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    attrs: Vec<(String, RawAttr)>,
}

impl RawEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a document object, keeping structural slots structural.
    pub fn from_object(map: Object) -> Self {
        let mut entry = Self::new();
        for (key, value) in map {
            let attr = match (key.as_str(), value) {
                ("type", Value::String(name)) => RawAttr::Type(TypeSpec::parse(&name)),
                ("items", v) => RawAttr::Def(Box::new(RawDef::from(v))),
                ("properties", Value::Object(props)) => RawAttr::Properties(
                    props
                        .into_iter()
                        .map(|(name, def)| (name, RawDef::from(def)))
                        .collect(),
                ),
                ("enum", Value::Array(members)) => {
                    RawAttr::Enum(members.into_iter().map(EnumMember::Literal).collect())
                }
                (_, v) => RawAttr::Value(v),
            };
            entry.attrs.push((key, attr));
        }
        entry
    }

    /// Set a slot, replacing any previous value under the same key.
    pub fn set(mut self, key: impl Into<String>, attr: RawAttr) -> Self {
        let key = key.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = attr,
            None => self.attrs.push((key, attr)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&RawAttr> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, a)| a)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &RawAttr)> {
        self.attrs.iter().map(|(k, a)| (k.as_str(), a))
    }

    /// The `$ref` target, if this entry is a placeholder.
    pub fn ref_name(&self) -> Option<&str> {
        match self.get("$ref") {
            Some(RawAttr::Value(Value::String(name))) => Some(name),
            _ => None,
        }
    }

    pub fn type_name(self, name: &str) -> Self {
        self.set("type", RawAttr::Type(TypeSpec::parse(name)))
    }

    pub fn type_spec(self, spec: impl Into<TypeSpec>) -> Self {
        self.set("type", RawAttr::Type(spec.into()))
    }

    pub fn required(self, on: bool) -> Self {
        self.set("required", RawAttr::Value(Value::Bool(on)))
    }

    pub fn nullable(self, on: bool) -> Self {
        self.set("nullable", RawAttr::Value(Value::Bool(on)))
    }

    pub fn default_value(self, value: impl Into<Value>) -> Self {
        self.set("default", RawAttr::Value(value.into()))
    }

    /// Default produced on demand, once per absent value.
    pub fn default_with<F>(self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.set("default", RawAttr::Producer(Producer::new(f)))
    }

    pub fn validator(self, validator: Validator) -> Self {
        self.set("validator", RawAttr::Validator(validator))
    }

    pub fn coerce(self, on: bool) -> Self {
        self.set("coerce", RawAttr::Value(Value::Bool(on)))
    }

    pub fn strict_type(self, on: bool) -> Self {
        self.set("strictType", RawAttr::Value(Value::Bool(on)))
    }

    /// Raise instead of collecting when this field fails.
    pub fn throw(self, on: bool) -> Self {
        self.set("throw", RawAttr::Value(Value::Bool(on)))
    }

    pub fn one_of<I, M>(self, members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<EnumMember>,
    {
        self.set(
            "enum",
            RawAttr::Enum(members.into_iter().map(Into::into).collect()),
        )
    }

    /// Pattern source, compiled (and length-checked) at normalization.
    ///
    /// Sources use the `regex` crate syntax: no look-around and no
    /// backreferences. `^(?=.*\d).{8,}$` fails construction with
    /// `ERR_SCHEMA_REGEX`; express such rules with a validator instead.
    pub fn regex(self, source: &str) -> Self {
        self.set("regex", RawAttr::Value(Value::String(source.to_string())))
    }

    /// Precompiled pattern, exempt from the length limit.
    pub fn pattern(self, pattern: Pattern) -> Self {
        self.set("regex", RawAttr::Pattern(pattern))
    }

    pub fn min(self, bound: f64) -> Self {
        self.set("min", RawAttr::Value(Value::Number(bound)))
    }

    pub fn max(self, bound: f64) -> Self {
        self.set("max", RawAttr::Value(Value::Number(bound)))
    }

    pub fn items(self, def: impl Into<RawDef>) -> Self {
        self.set("items", RawAttr::Def(Box::new(def.into())))
    }

    /// Declare one nested property. Properties keep declaration order.
    pub fn property(mut self, name: impl Into<String>, def: impl Into<RawDef>) -> Self {
        let name = name.into();
        let def = def.into();
        match self.attrs.iter_mut().find(|(k, _)| k == "properties") {
            Some((_, RawAttr::Properties(props))) => {
                match props.iter_mut().find(|(n, _)| *n == name) {
                    Some(slot) => slot.1 = def,
                    None => props.push((name, def)),
                }
                self
            }
            _ => self.set("properties", RawAttr::Properties(vec![(name, def)])),
        }
    }

    pub fn error_message(self, message: impl Into<String>) -> Self {
        self.set("errorMessage", RawAttr::Value(Value::String(message.into())))
    }

    pub fn reference(self, name: impl Into<String>) -> Self {
        self.set("$ref", RawAttr::Value(Value::String(name.into())))
    }

    /// Caller-defined metadata, preserved on the descriptor.
    pub fn meta(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, RawAttr::Value(value.into()))
    }
}

// ---- Shared definitions ----

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// A definition reused in several places. Normalized once per build and
/// identified by a stable handle rather than by address.
#[derive(Clone)]
pub struct SharedDef {
    handle: u64,
    def: Arc<RawDef>,
}

impl SharedDef {
    pub fn new(def: impl Into<RawDef>) -> Self {
        Self {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            def: Arc::new(def.into()),
        }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn def(&self) -> &RawDef {
        &self.def
    }
}

impl PartialEq for SharedDef {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl fmt::Debug for SharedDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDef")
            .field("handle", &self.handle)
            .field("def", &self.def)
            .finish()
    }
}

// ---- Schema definitions ----

/// A raw schema: ordered top-level fields plus local `$defs`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDef {
    fields: Vec<(String, RawDef)>,
    defs: Vec<(String, RawDef)>,
}

impl SchemaDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a top-level field, replacing an earlier one of the same name.
    pub fn field(mut self, name: impl Into<String>, def: impl Into<RawDef>) -> Self {
        upsert(&mut self.fields, name.into(), def.into());
        self
    }

    /// Declare a local `$defs` entry.
    pub fn define(mut self, name: impl Into<String>, def: impl Into<RawDef>) -> Self {
        upsert(&mut self.defs, name.into(), def.into());
        self
    }

    pub fn fields(&self) -> &[(String, RawDef)] {
        &self.fields
    }

    pub fn defs(&self) -> &[(String, RawDef)] {
        &self.defs
    }

    pub fn get_field(&self, name: &str) -> Option<&RawDef> {
        find(&self.fields, name)
    }

    pub fn get_def(&self, name: &str) -> Option<&RawDef> {
        find(&self.defs, name)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| SchemaError::Config(format!("schema definition: {e}")))?;
        Self::try_from(json)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        let json: serde_json::Value = serde_yaml::from_str(text)
            .map_err(|e| SchemaError::Config(format!("schema definition: {e}")))?;
        Self::try_from(json)
    }

    /// Find the raw definition addressed by a dotted/bracketed path, as
    /// if the schema were a plain nested document (`node`,
    /// `node.properties.children.items`, `$defs.point`, ...).
    pub fn lookup(&self, path: &str) -> Option<RawDef> {
        let segments = path::parse(path);
        let (first, rest) = segments.split_first()?;
        let start = match first {
            Segment::Key(key) if key == "$defs" => {
                let (name, rest) = rest.split_first()?;
                return find(&self.defs, &segment_key(name))
                    .and_then(|def| walk_def(def, rest));
            }
            other => find(&self.fields, &segment_key(other))?,
        };
        walk_def(start, rest)
    }
}

impl TryFrom<serde_json::Value> for SchemaDef {
    type Error = SchemaError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match Value::from(json) {
            Value::Object(map) => Ok(Self::try_from(map)?),
            other => Err(SchemaError::InvalidArgument(format!(
                "schema definition must be an object, received {}",
                other.kind_name()
            ))),
        }
    }
}

impl TryFrom<Object> for SchemaDef {
    type Error = SchemaError;

    fn try_from(map: Object) -> Result<Self, Self::Error> {
        let mut def = SchemaDef::new();
        for (name, raw) in map {
            if name == "$defs" {
                if let Value::Object(defs) = raw {
                    for (def_name, def_raw) in defs {
                        def = def.define(def_name, RawDef::from(def_raw));
                    }
                }
                continue;
            }
            def = def.field(name, RawDef::from(raw));
        }
        Ok(def)
    }
}

fn upsert(list: &mut Vec<(String, RawDef)>, name: String, def: RawDef) {
    match list.iter_mut().find(|(n, _)| *n == name) {
        Some(slot) => slot.1 = def,
        None => list.push((name, def)),
    }
}

fn find<'a>(list: &'a [(String, RawDef)], name: &str) -> Option<&'a RawDef> {
    list.iter().find(|(n, _)| n == name).map(|(_, d)| d)
}

fn segment_key(segment: &Segment) -> String {
    match segment {
        Segment::Key(key) => key.clone(),
        Segment::Index(index) => index.to_string(),
    }
}

fn walk_def(def: &RawDef, rest: &[Segment]) -> Option<RawDef> {
    let Some((segment, rest)) = rest.split_first() else {
        return Some(def.clone());
    };
    match def {
        RawDef::Shared(shared) => walk_def(shared.def(), std::slice::from_ref(segment))
            .and_then(|d| walk_def(&d, rest)),
        RawDef::Pair(first, overrides) => match segment_key(segment).as_str() {
            "0" => walk_def(first, rest),
            "1" => walk_entry(overrides, rest),
            _ => None,
        },
        RawDef::Entry(entry) => walk_attr(entry.get(&segment_key(segment))?, rest),
        RawDef::Literal(value) => walk_value(value, segment, rest),
        RawDef::TypeName(_) | RawDef::Type(_) | RawDef::Validator(_) => None,
    }
}

fn walk_entry(entry: &RawEntry, rest: &[Segment]) -> Option<RawDef> {
    match rest.split_first() {
        None => Some(RawDef::Entry(entry.clone())),
        Some((segment, rest)) => walk_attr(entry.get(&segment_key(segment))?, rest),
    }
}

fn walk_attr(attr: &RawAttr, rest: &[Segment]) -> Option<RawDef> {
    match attr {
        RawAttr::Def(def) => walk_def(def, rest),
        RawAttr::Properties(props) => match rest.split_first() {
            None => None,
            Some((segment, rest)) => walk_def(find(props, &segment_key(segment))?, rest),
        },
        RawAttr::Value(value) => match rest.split_first() {
            None => Some(RawDef::from(value.clone())),
            Some((segment, rest)) => walk_value(value, segment, rest),
        },
        RawAttr::Type(spec) if rest.is_empty() => Some(RawDef::Type(spec.clone())),
        RawAttr::Validator(v) if rest.is_empty() => Some(RawDef::Validator(v.clone())),
        _ => None,
    }
}

fn walk_value(value: &Value, segment: &Segment, rest: &[Segment]) -> Option<RawDef> {
    let key = segment_key(segment);
    let next = match value {
        Value::Object(map) => map.get(&key)?,
        Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
        _ => return None,
    };
    match rest.split_first() {
        None => Some(RawDef::from(next.clone())),
        Some((segment, rest)) => walk_value(next, segment, rest),
    }
}

//! # Type Matching
//!
//! A declared field type is either one of a fixed set of tags
//! ([`TypeTag`]) or a host-registered [`ExternalType`] carrying its own
//! matcher and optional converter. There is no open-ended runtime
//! `instanceof` dispatch: a host type the engine does not know about must
//! be registered explicitly.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::value::{short_type_name, Value};

/// The closed set of built-in type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Object,
    Array,
    BigInt,
    Function,
    Symbol,
    Null,
    Undefined,
    Any,
    Date,
    #[serde(alias = "regex")]
    Regexp,
    Map,
    Set,
    Url,
    Buffer,
}

impl TypeTag {
    pub fn all() -> &'static [TypeTag] {
        &[
            Self::String,
            Self::Number,
            Self::Boolean,
            Self::Object,
            Self::Array,
            Self::BigInt,
            Self::Function,
            Self::Symbol,
            Self::Null,
            Self::Undefined,
            Self::Any,
            Self::Date,
            Self::Regexp,
            Self::Map,
            Self::Set,
            Self::Url,
            Self::Buffer,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::BigInt => "bigint",
            Self::Function => "function",
            Self::Symbol => "symbol",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Any => "any",
            Self::Date => "date",
            Self::Regexp => "regexp",
            Self::Map => "map",
            Self::Set => "set",
            Self::Url => "url",
            Self::Buffer => "buffer",
        }
    }

    /// Types whose coercion failure is fatal (`ERR_COERCE`). For every
    /// other type a failed coercion is advisory and the type check decides.
    pub fn is_core_primitive(&self) -> bool {
        matches!(
            self,
            Self::String | Self::Number | Self::Boolean | Self::Array | Self::Object
        )
    }

    /// Whether a present value satisfies this tag.
    ///
    /// `object` accepts only plain keyed structures. `undefined`,
    /// `function` and `symbol` never match a present value.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => matches!(value, Value::String(_)),
            Self::Number => matches!(value, Value::Number(_)),
            Self::Boolean => matches!(value, Value::Bool(_)),
            Self::Object => matches!(value, Value::Object(_)),
            Self::Array => matches!(value, Value::Array(_)),
            Self::BigInt => matches!(value, Value::BigInt(_)),
            Self::Null => matches!(value, Value::Null),
            Self::Date => matches!(value, Value::Date(_)),
            Self::Regexp => matches!(value, Value::Regex(_)),
            Self::Map => matches!(value, Value::Map(_)),
            Self::Set => matches!(value, Value::Set(_)),
            Self::Url => matches!(value, Value::Url(_)),
            Self::Buffer => matches!(value, Value::Buffer(_)),
            Self::Function | Self::Symbol | Self::Undefined => false,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "regex" {
            return Ok(Self::Regexp);
        }
        Self::all()
            .iter()
            .copied()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| CoreError::UnknownTypeTag(s.to_string()))
    }
}

// ---- External types ----

type Matcher = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type Converter = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// A host-application type, identified by name and recognised by a
/// matcher predicate. The optional converter backs coercion.
#[derive(Clone)]
pub struct ExternalType {
    name: Arc<str>,
    matcher: Matcher,
    converter: Option<Converter>,
}

impl ExternalType {
    pub fn new<F>(name: &str, matcher: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            matcher: Arc::new(matcher),
            converter: None,
        }
    }

    /// Matches [`Value::External`] values wrapping a `T`.
    pub fn of<T: Any>() -> Self {
        Self::new(short_type_name::<T>(), |value| match value {
            Value::External(ext) => ext.is::<T>(),
            _ => false,
        })
    }

    /// Attach a converter used when coercion is requested.
    pub fn with_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the matcher. A panicking matcher counts as "no match".
    pub fn matches(&self, value: &Value) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.matcher)(value))).unwrap_or(false)
    }

    /// Run the converter, if any. A panic is reported as an error.
    pub fn convert(&self, value: &Value) -> Option<Result<Value, String>> {
        let converter = self.converter.as_ref()?;
        Some(
            catch_unwind(AssertUnwindSafe(|| converter(value)))
                .unwrap_or_else(|_| Err(format!("{} converter panicked", self.name))),
        )
    }
}

impl PartialEq for ExternalType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.matcher, &other.matcher)
    }
}

impl fmt::Debug for ExternalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalType")
            .field("name", &self.name)
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

// ---- Declared types ----

/// The `type` slot of a field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Tag(TypeTag),
    External(ExternalType),
    /// A name outside the tag set. Reported at construction; never matches.
    Unrecognized(String),
}

impl TypeSpec {
    /// Parse a type name, keeping unknown names as [`TypeSpec::Unrecognized`].
    pub fn parse(name: &str) -> Self {
        name.parse::<TypeTag>()
            .map(Self::Tag)
            .unwrap_or_else(|_| Self::Unrecognized(name.to_string()))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Tag(TypeTag::Any))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Tag(TypeTag::Null))
    }

    pub fn is_core_primitive(&self) -> bool {
        matches!(self, Self::Tag(tag) if tag.is_core_primitive())
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Tag(tag) => tag.matches(value),
            Self::External(ext) => ext.matches(value),
            Self::Unrecognized(_) => false,
        }
    }

    /// Expected-type wording for `ERR_TYPE` messages.
    pub fn expected_label(&self) -> String {
        match self {
            Self::Tag(tag) => format!("type {tag}"),
            Self::External(ext) => format!("a valid instance of the {} class", ext.name()),
            Self::Unrecognized(name) => format!("type {name}"),
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::External(ext) => f.write_str(ext.name()),
            Self::Unrecognized(name) => f.write_str(name),
        }
    }
}

impl From<TypeTag> for TypeSpec {
    fn from(tag: TypeTag) -> Self {
        Self::Tag(tag)
    }
}

impl From<ExternalType> for TypeSpec {
    fn from(ext: ExternalType) -> Self {
        Self::External(ext)
    }
}

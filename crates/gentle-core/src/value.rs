//! # Runtime Values
//!
//! The engine validates more than JSON: dates, compiled patterns, maps,
//! sets, URLs, big integers, byte buffers and opaque host objects all flow
//! through the same checkers. [`Value`] is the closed set of those kinds.
//!
//! ## Absence
//!
//! A missing field is `Option<Value>::None` at every API boundary. There is
//! no "undefined" variant; `Value::Null` is an explicit null.
//!
//! ## Equality
//!
//! Structural, with IEEE semantics for numbers (`NaN != NaN`). Patterns
//! compare by source text, external values by identity. Objects compare as
//! maps, but iterate and serialize in insertion order.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// Keyed structure in insertion order. Equality ignores order.
pub type Object = IndexMap<String, Value>;

/// A runtime value under validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    BigInt(i128),
    Date(DateTime<Utc>),
    Regex(Pattern),
    /// Ordered key/value entries. Keys may be any value.
    Map(Vec<(Value, Value)>),
    /// Ordered, deduplicated members.
    Set(Vec<Value>),
    Url(Url),
    Buffer(Vec<u8>),
    External(ExternalValue),
}

impl Value {
    /// Received-type label used in type mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::BigInt(_) => "bigint",
            Value::Object(_)
            | Value::Date(_)
            | Value::Regex(_)
            | Value::Map(_)
            | Value::Set(_)
            | Value::Url(_)
            | Value::Buffer(_)
            | Value::External(_) => "object",
        }
    }

    /// Flag coercion: `false`, `0`, `NaN`, `""` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::BigInt(n) => *n != 0,
            _ => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key on a keyed structure.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// `SameValueZero` comparison: like `==` except `NaN` equals `NaN`.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self == other,
        }
    }

    /// Lossy conversion to JSON.
    ///
    /// Non-finite numbers become `null`. Dates render as RFC 3339 with
    /// millisecond precision, big integers as numbers when they fit in an
    /// `i64` (strings otherwise), maps as `[key, value]` pairs, buffers as
    /// byte arrays and patterns as their source.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) | Value::Set(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::BigInt(n) => match i64::try_from(*n) {
                Ok(small) => Json::from(small),
                Err(_) => Json::String(n.to_string()),
            },
            Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Regex(p) => Json::String(p.as_str().to_string()),
            Value::Map(entries) => Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
            Value::Url(u) => Json::String(u.as_str().to_string()),
            Value::Buffer(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            Value::External(ext) => Json::String(format!("[object {}]", ext.type_name())),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Render a number the way a script engine would print it
/// (`10`, `1.5`, `NaN`, `Infinity`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let label = if n > 0.0 { "Infinity" } else { "-Infinity" };
        label.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// String rendering, used for coercion toward `string` and for
/// validator messages.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_null() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::BigInt(n) => write!(f, "{n}"),
            Value::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Regex(p) => write!(f, "{p}"),
            Value::Map(_) => f.write_str("[object Map]"),
            Value::Set(_) => f.write_str("[object Set]"),
            Value::Url(u) => f.write_str(u.as_str()),
            Value::Buffer(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Value::External(ext) => write!(f, "[object {}]", ext.type_name()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

// ---- Conversions ----

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::Object(map)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Url> for Value {
    fn from(u: Url) -> Self {
        Value::Url(u)
    }
}

impl From<Pattern> for Value {
    fn from(p: Pattern) -> Self {
        Value::Regex(p)
    }
}

impl From<ExternalValue> for Value {
    fn from(ext: ExternalValue) -> Self {
        Value::External(ext)
    }
}

// ---- Pattern ----

/// A compiled regular expression that compares by source.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile `source` with the `regex` crate. Look-around and
    /// backreferences are rejected; matching runs in linear time.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern(re)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({self})")
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

// ---- External values ----

/// An opaque host object carried through validation untouched.
///
/// Matched against [`ExternalType`](crate::types::ExternalType) by type.
#[derive(Clone)]
pub struct ExternalValue {
    type_name: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ExternalValue {
    /// Wrap a host value, naming it after its Rust type.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::named(short_type_name::<T>(), value)
    }

    /// Wrap a host value under an explicit class name.
    pub fn named<T: Any + Send + Sync>(name: &str, value: T) -> Self {
        Self {
            type_name: Arc::from(name),
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for ExternalValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ExternalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Last path segment of a Rust type name (`my_crate::Money` → `Money`).
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers_are_f64() {
        let v = Value::from(json!({"a": 1, "b": [true, null, "x"]}));
        assert_eq!(v.get("a"), Some(&Value::Number(1.0)));
        let b = v.get("b").and_then(Value::as_array).unwrap();
        assert_eq!(b[0], Value::Bool(true));
        assert!(b[1].is_null());
    }

    #[test]
    fn test_objects_keep_document_order() {
        let v = Value::from(json!({"zeta": 1, "alpha": 2, "mid": 3}));
        let keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"{"zeta":1,"alpha":2,"mid":3}"#
        );
        assert_eq!(v, Value::from(json!({"alpha": 2, "mid": 3, "zeta": 1})));
    }

    #[test]
    fn test_to_json_integral_numbers() {
        let v = Value::Number(10.0);
        assert_eq!(v.to_json(), json!(10));
        assert_eq!(Value::Number(1.5).to_json(), json!(1.5));
        assert_eq!(Value::Number(f64::NAN).to_json(), json!(null));
    }

    #[test]
    fn test_to_json_rich_kinds() {
        let date = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Value::Date(date).to_json(), json!("2024-01-02T03:04:05.000Z"));
        assert_eq!(Value::BigInt(42).to_json(), json!(42));
        assert_eq!(
            Value::BigInt(i128::MAX).to_json(),
            json!(i128::MAX.to_string())
        );
        assert_eq!(Value::Buffer(vec![1, 2]).to_json(), json!([1, 2]));
        let map = Value::Map(vec![(Value::from("k"), Value::from(1))]);
        assert_eq!(map.to_json(), json!([["k", 1]]));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Value::Null.kind_name(), "null");
        assert_eq!(Value::Array(vec![]).kind_name(), "array");
        assert_eq!(Value::BigInt(1).kind_name(), "bigint");
        assert_eq!(Value::Buffer(vec![]).kind_name(), "object");
        assert_eq!(Value::Set(vec![]).kind_name(), "object");
    }

    #[test]
    fn test_nan_is_not_equal_to_itself() {
        let nan = Value::Number(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.same_value_zero(&nan.clone()));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::from("no").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_display_rendering() {
        assert_eq!(Value::from(10).to_string(), "10");
        assert_eq!(Value::from(0.5).to_string(), "0.5");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(
            Value::Array(vec![Value::from(1), Value::Null, Value::from("a")]).to_string(),
            "1,,a"
        );
        assert_eq!(Value::Object(Object::new()).to_string(), "[object Object]");
    }

    #[test]
    fn test_pattern_equality_by_source() {
        let a = Pattern::new("^a+$").unwrap();
        let b = Pattern::new("^a+$").unwrap();
        assert_eq!(a, b);
        assert!(a.is_match("aaa"));
        assert_eq!(a.to_string(), "/^a+$/");
    }

    #[derive(Debug)]
    struct Money(u32);

    #[test]
    fn test_external_identity() {
        let a = ExternalValue::new(Money(5));
        let b = ExternalValue::new(Money(5));
        assert_eq!(a.type_name(), "Money");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.downcast_ref::<Money>().map(|m| m.0), Some(5));
        assert!(!a.is::<String>());
    }

    #[test]
    fn test_deserialize_via_json() {
        let v: Value = serde_json::from_str(r#"{"x":[1,2]}"#).unwrap();
        assert_eq!(
            v.get("x"),
            Some(&Value::Array(vec![Value::from(1), Value::from(2)]))
        );
    }
}

//! # Coercion
//!
//! Best-effort, type-directed conversion applied before the type check
//! when a field (or the whole schema) asks for it.
//!
//! A failure toward one of the core primitives (string, number, boolean,
//! array, object) is fatal for the field. Toward any other type it is
//! advisory: the caller keeps the original value and lets the type check
//! decide.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

use crate::types::{TypeSpec, TypeTag};
use crate::value::{format_number, Object, Pattern, Value};

/// Why a coercion did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoercionError {
    #[error("cannot coerce empty/null to number")]
    EmptyNumber,

    #[error("invalid number")]
    InvalidNumber,

    #[error("invalid boolean")]
    InvalidBoolean,

    #[error("{0}")]
    Json(String),

    #[error("cannot coerce to {0}")]
    Unsupported(&'static str),

    #[error("invalid Date")]
    InvalidDate,

    #[error("invalid regular expression: {0}")]
    Pattern(String),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("Cannot convert {0} to a BigInt")]
    BigInt(String),

    #[error("map entry at index {0} is not a [key, value] pair")]
    MapEntry(usize),

    /// A host converter rejected the value.
    #[error("{0}")]
    Host(String),

    #[error("no safe coercion for constructor")]
    NoConstructorCoercion,

    #[error("no coercion rule")]
    NoRule,
}

/// Convert `value` toward `spec`.
pub fn coerce(value: &Value, spec: &TypeSpec) -> Result<Value, CoercionError> {
    match spec {
        TypeSpec::Tag(tag) => coerce_to_tag(value, *tag),
        TypeSpec::External(ext) => match ext.convert(value) {
            Some(result) => result.map_err(CoercionError::Host),
            None if ext.matches(value) => Ok(value.clone()),
            None => Err(CoercionError::NoConstructorCoercion),
        },
        TypeSpec::Unrecognized(_) => Err(CoercionError::NoRule),
    }
}

fn coerce_to_tag(value: &Value, tag: TypeTag) -> Result<Value, CoercionError> {
    match tag {
        TypeTag::Number => to_number(value).map(Value::Number),
        TypeTag::String => Ok(match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        }),
        TypeTag::Boolean => to_boolean(value).map(Value::Bool),
        TypeTag::Array => match value {
            Value::Array(_) => Ok(value.clone()),
            Value::String(text) => match parse_json(text)? {
                parsed @ Value::Array(_) => Ok(parsed),
                _ => Err(CoercionError::Unsupported("array")),
            },
            _ => Err(CoercionError::Unsupported("array")),
        },
        TypeTag::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            Value::String(text) => match parse_json(text)? {
                parsed @ Value::Object(_) => Ok(parsed),
                _ => Err(CoercionError::Unsupported("object")),
            },
            _ => Err(CoercionError::Unsupported("object")),
        },
        TypeTag::Date => to_date(value).map(Value::Date),
        TypeTag::Regexp => match value {
            Value::Regex(_) => Ok(value.clone()),
            Value::String(source) => Pattern::new(source)
                .map(Value::Regex)
                .map_err(|e| CoercionError::Pattern(e.to_string())),
            _ => Err(CoercionError::Unsupported("RegExp")),
        },
        TypeTag::Map => to_map(value).map(Value::Map),
        TypeTag::Set => match value {
            Value::Set(_) => Ok(value.clone()),
            Value::Array(items) => Ok(Value::Set(dedupe(items.iter()))),
            Value::Object(map) => Ok(Value::Set(dedupe(map.values()))),
            _ => Err(CoercionError::Unsupported("Set")),
        },
        TypeTag::Url => match value {
            Value::Url(_) => Ok(value.clone()),
            Value::String(text) => url::Url::parse(text)
                .map(Value::Url)
                .map_err(|e| CoercionError::Url(e.to_string())),
            _ => Err(CoercionError::Unsupported("URL")),
        },
        TypeTag::BigInt => to_bigint(value).map(Value::BigInt),
        TypeTag::Buffer => match value {
            Value::Buffer(_) => Ok(value.clone()),
            Value::String(text) => Ok(Value::Buffer(text.as_bytes().to_vec())),
            Value::Array(items) => Ok(Value::Buffer(items.iter().map(byte_of).collect())),
            _ => Err(CoercionError::Unsupported("Buffer")),
        },
        TypeTag::Function
        | TypeTag::Symbol
        | TypeTag::Null
        | TypeTag::Undefined
        | TypeTag::Any => Err(CoercionError::NoRule),
    }
}

fn parse_json(text: &str) -> Result<Value, CoercionError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|e| CoercionError::Json(e.to_string()))
}

// ---- Numbers ----

fn to_number(value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Null => Err(CoercionError::EmptyNumber),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::BigInt(n) => Ok(*n as f64),
        Value::Date(d) => Ok(d.timestamp_millis() as f64),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(CoercionError::EmptyNumber);
            }
            parse_numeric(trimmed).ok_or(CoercionError::InvalidNumber)
        }
        _ => Err(CoercionError::InvalidNumber),
    }
}

/// Numeric literal grammar: signed decimal with optional fraction and
/// exponent, `Infinity`, and unsigned `0x`/`0o`/`0b` integers.
fn parse_numeric(text: &str) -> Option<f64> {
    match text {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    if let Some(n) = parse_radix(text) {
        return Some(n as f64);
    }
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("inf") || lowered.contains("nan") {
        return None;
    }
    text.parse::<f64>().ok()
}

fn parse_radix(text: &str) -> Option<i128> {
    let (digits, radix) = match text.get(..2) {
        Some("0x") | Some("0X") => (&text[2..], 16),
        Some("0o") | Some("0O") => (&text[2..], 8),
        Some("0b") | Some("0B") => (&text[2..], 2),
        _ => return None,
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    i128::from_str_radix(digits, radix).ok()
}

fn to_boolean(value: &Value) -> Result<bool, CoercionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" || s == "1" => Ok(true),
        Value::String(s) if s == "false" || s == "0" => Ok(false),
        Value::Number(n) if *n == 1.0 => Ok(true),
        Value::Number(n) if *n == 0.0 => Ok(false),
        _ => Err(CoercionError::InvalidBoolean),
    }
}

fn to_bigint(value: &Value) -> Result<i128, CoercionError> {
    match value {
        Value::BigInt(n) => Ok(*n),
        Value::Number(n) => {
            if n.is_finite() && n.fract() == 0.0 {
                Ok(*n as i128)
            } else {
                Err(CoercionError::BigInt(format_number(*n)))
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            parse_radix(trimmed)
                .or_else(|| trimmed.parse::<i128>().ok())
                .ok_or_else(|| CoercionError::BigInt(text.clone()))
        }
        _ => Err(CoercionError::Unsupported("BigInt")),
    }
}

// ---- Dates ----

fn to_date(value: &Value) -> Result<DateTime<Utc>, CoercionError> {
    match value {
        Value::Date(d) => Ok(*d),
        Value::Number(ms) => {
            if !ms.is_finite() {
                return Err(CoercionError::InvalidDate);
            }
            Utc.timestamp_millis_opt(*ms as i64)
                .single()
                .ok_or(CoercionError::InvalidDate)
        }
        Value::String(text) => parse_date(text.trim()).ok_or(CoercionError::InvalidDate),
        _ => Err(CoercionError::Unsupported("Date")),
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(text) {
        return Some(d.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// ---- Collections ----

fn to_map(value: &Value) -> Result<Vec<(Value, Value)>, CoercionError> {
    match value {
        Value::Map(entries) => Ok(entries.clone()),
        Value::Object(map) => Ok(object_entries(map)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Array(pair) => Ok((
                    pair.first().cloned().unwrap_or(Value::Null),
                    pair.get(1).cloned().unwrap_or(Value::Null),
                )),
                _ => Err(CoercionError::MapEntry(i)),
            })
            .collect(),
        _ => Err(CoercionError::Unsupported("Map")),
    }
}

fn object_entries(map: &Object) -> Vec<(Value, Value)> {
    map.iter()
        .map(|(k, v)| (Value::String(k.clone()), v.clone()))
        .collect()
}

fn dedupe<'a>(items: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|existing| existing.same_value_zero(item)) {
            out.push(item.clone());
        }
    }
    out
}

fn byte_of(value: &Value) -> u8 {
    match value {
        Value::Number(n) if n.is_finite() => (n.trunc() as i64 & 0xff) as u8,
        _ => 0,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z0-9_ .\\[\\]{}\"-]{0,20}".prop_map(Value::String),
        ]
    }

    proptest! {
        /// A successful coercion always produces a value of the target type.
        #[test]
        fn coerced_value_matches_tag(
            value in json_leaf(),
            tag in prop::sample::select(TypeTag::all().to_vec()),
        ) {
            let spec = TypeSpec::Tag(tag);
            if let Ok(out) = coerce(&value, &spec) {
                if !matches!(tag, TypeTag::Any) {
                    prop_assert!(spec.matches(&out), "{tag} coercion produced {out:?}");
                }
            }
        }

        /// Coercing an already-coerced value is a no-op.
        #[test]
        fn coercion_is_idempotent(
            value in json_leaf(),
            tag in prop::sample::select(vec![
                TypeTag::String, TypeTag::Number, TypeTag::Boolean, TypeTag::BigInt,
            ]),
        ) {
            let spec = TypeSpec::Tag(tag);
            if let Ok(once) = coerce(&value, &spec) {
                let twice = coerce(&once, &spec);
                prop_assert_eq!(twice, Ok(once));
            }
        }

        /// Integer strings coerce to the same integer.
        #[test]
        fn integer_strings_parse(n in any::<i32>()) {
            let out = coerce(&Value::String(n.to_string()), &TypeSpec::Tag(TypeTag::Number));
            prop_assert_eq!(out, Ok(Value::from(n)));
        }
    }
}

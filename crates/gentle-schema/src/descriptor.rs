//! # Field Descriptors
//!
//! The canonical, normalized description of one field or item slot. A
//! [`Descriptor`] is either an unresolved reference placeholder or a fully
//! normalized [`FieldDescriptor`]; the two are never merged directly.

use std::collections::BTreeMap;

use gentle_core::{Pattern, TypeSpec, Value};

use crate::validator::{Predicate, Producer, Validator};

/// A normalized field slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// `$ref` placeholder, resolved lazily by name.
    Ref(String),
    Field(FieldDescriptor),
}

impl Descriptor {
    pub fn as_field(&self) -> Option<&FieldDescriptor> {
        match self {
            Self::Field(field) => Some(field),
            Self::Ref(_) => None,
        }
    }

    pub fn ref_name(&self) -> Option<&str> {
        match self {
            Self::Ref(name) => Some(name),
            Self::Field(_) => None,
        }
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::Field(FieldDescriptor::default())
    }
}

impl From<FieldDescriptor> for Descriptor {
    fn from(field: FieldDescriptor) -> Self {
        Self::Field(field)
    }
}

/// Default applied when the incoming value is absent.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    Producer(Producer),
}

impl DefaultValue {
    /// Materialize the default. A panicking producer yields `Err`.
    pub fn produce(&self) -> Result<Value, String> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Producer(producer) => producer.produce(),
        }
    }
}

/// One allowed enum member.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumMember {
    Literal(Value),
    Predicate(Predicate),
}

impl EnumMember {
    /// Label used in `ERR_ENUM` messages.
    pub fn label(&self) -> String {
        match self {
            Self::Literal(value) => value.to_json().to_string(),
            Self::Predicate(p) => format!("<fn:{}>", p.name()),
        }
    }
}

impl From<Value> for EnumMember {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for EnumMember {
    fn from(value: &str) -> Self {
        Self::Literal(value.into())
    }
}

impl From<String> for EnumMember {
    fn from(value: String) -> Self {
        Self::Literal(value.into())
    }
}

impl From<f64> for EnumMember {
    fn from(value: f64) -> Self {
        Self::Literal(value.into())
    }
}

impl From<i64> for EnumMember {
    fn from(value: i64) -> Self {
        Self::Literal(value.into())
    }
}

impl From<i32> for EnumMember {
    fn from(value: i32) -> Self {
        Self::Literal(value.into())
    }
}

impl From<bool> for EnumMember {
    fn from(value: bool) -> Self {
        Self::Literal(value.into())
    }
}

impl From<Predicate> for EnumMember {
    fn from(p: Predicate) -> Self {
        Self::Predicate(p)
    }
}

/// Pattern rule. A `regex` slot holding something other than a pattern is
/// kept so the checker can report it.
#[derive(Debug, Clone, PartialEq)]
pub enum RegexRule {
    Pattern(Pattern),
    Invalid(Value),
}

/// Every rule of one normalized field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDescriptor {
    pub type_spec: Option<TypeSpec>,
    /// `None` reads as `false`; kept optional so fragments can relax it.
    pub required: Option<bool>,
    /// `None` defers to the instance-wide option.
    pub nullable: Option<bool>,
    pub default: Option<DefaultValue>,
    pub validator: Option<Validator>,
    pub coerce: Option<bool>,
    pub strict_type: Option<bool>,
    pub throw: Option<bool>,
    pub enum_members: Option<Vec<EnumMember>>,
    pub regex: Option<RegexRule>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub items: Option<Box<Descriptor>>,
    /// Nested fields, in declaration order.
    pub properties: Option<Vec<(String, Descriptor)>>,
    pub error_message: Option<String>,
    /// Caller metadata, kept verbatim.
    pub extra: BTreeMap<String, Value>,
}

impl FieldDescriptor {
    pub fn typed(spec: impl Into<TypeSpec>) -> Self {
        Self {
            type_spec: Some(spec.into()),
            ..Self::default()
        }
    }

    pub fn property(&self, name: &str) -> Option<&Descriptor> {
        self.properties
            .as_ref()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn throws(&self) -> bool {
        self.throw.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gentle_core::TypeTag;

    #[test]
    fn test_enum_labels() {
        assert_eq!(EnumMember::from("a").label(), "\"a\"");
        assert_eq!(EnumMember::from(3).label(), "3");
        let p = Predicate::named("is_even", |_| true);
        assert_eq!(EnumMember::from(p).label(), "<fn:is_even>");
    }

    #[test]
    fn test_property_lookup_keeps_order() {
        let field = FieldDescriptor {
            properties: Some(vec![
                ("b".into(), FieldDescriptor::typed(TypeTag::String).into()),
                ("a".into(), Descriptor::Ref("x".into())),
            ]),
            ..FieldDescriptor::typed(TypeTag::Object)
        };
        assert_eq!(field.property("a").and_then(Descriptor::ref_name), Some("x"));
        assert!(field.property("c").is_none());
    }

    #[test]
    fn test_default_producer() {
        let d = DefaultValue::Producer(Producer::new(|| Value::from(7)));
        assert_eq!(d.produce(), Ok(Value::from(7)));
    }
}

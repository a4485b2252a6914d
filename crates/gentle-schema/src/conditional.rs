//! Conditional fragments.
//!
//! `schema.when("kind").is("small").then(fragment)` registers a rule whose
//! fragment overrides top-level field descriptors for any call where the
//! condition holds on the whole input. Rules are append-only, evaluated
//! in registration order, and identified by their index.

use std::collections::BTreeMap;

use gentle_core::{path, Value};
use tracing::trace;

use crate::descriptor::Descriptor;
use crate::engine::Schema;
use crate::error::SchemaError;
use crate::raw::SchemaDef;
use crate::validator::Predicate;

/// What a rule looks at.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    /// Dotted/bracketed path into the input.
    Path(String),
    /// Predicate over the whole input.
    Predicate(Predicate),
}

impl From<&str> for Subject {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for Subject {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<Predicate> for Subject {
    fn from(p: Predicate) -> Self {
        Self::Predicate(p)
    }
}

/// What the value at a path must be.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// The path must not resolve.
    Absent,
    /// Strict equality.
    Literal(Value),
    /// Predicate over the value at the path (`null` when absent).
    Predicate(Predicate),
}

impl From<Value> for Expectation {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

impl From<&str> for Expectation {
    fn from(v: &str) -> Self {
        Self::Literal(v.into())
    }
}

impl From<String> for Expectation {
    fn from(v: String) -> Self {
        Self::Literal(v.into())
    }
}

impl From<f64> for Expectation {
    fn from(v: f64) -> Self {
        Self::Literal(v.into())
    }
}

impl From<i32> for Expectation {
    fn from(v: i32) -> Self {
        Self::Literal(v.into())
    }
}

impl From<bool> for Expectation {
    fn from(v: bool) -> Self {
        Self::Literal(v.into())
    }
}

impl From<Predicate> for Expectation {
    fn from(p: Predicate) -> Self {
        Self::Predicate(p)
    }
}

/// One registered rule with its normalized fragment.
#[derive(Debug, Clone)]
pub(crate) struct ConditionalRule {
    pub subject: Subject,
    pub expect: Expectation,
    pub fragment: Vec<(String, Descriptor)>,
}

impl ConditionalRule {
    fn holds(&self, input: &Value) -> bool {
        match &self.subject {
            Subject::Predicate(p) => p.test(input),
            Subject::Path(at) => {
                let found = path::lookup(input, at);
                match &self.expect {
                    Expectation::Absent => found.is_none(),
                    Expectation::Literal(expected) => found == Some(expected),
                    Expectation::Predicate(p) => p.test(found.unwrap_or(&Value::Null)),
                }
            }
        }
    }

    pub(crate) fn fragment_for(&self, field: &str) -> Option<&Descriptor> {
        self.fragment
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, d)| d)
    }
}

/// Matching rule indices per overridden top-level field, in registration
/// order.
pub(crate) fn evaluate(rules: &[ConditionalRule], input: &Value) -> BTreeMap<String, Vec<usize>> {
    let mut overrides: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, rule) in rules.iter().enumerate() {
        if !rule.holds(input) {
            continue;
        }
        trace!(rule = index, fields = rule.fragment.len(), "conditional rule matched");
        for (field, _) in &rule.fragment {
            overrides.entry(field.clone()).or_default().push(index);
        }
    }
    overrides
}

/// Builder returned by [`Schema::when`].
#[must_use = "a condition does nothing until `.is(..).then(..)` registers it"]
pub struct When<'s> {
    schema: &'s mut Schema,
    subject: Subject,
    expect: Expectation,
}

impl<'s> When<'s> {
    pub(crate) fn new(schema: &'s mut Schema, subject: Subject) -> Self {
        // A whole-input predicate needs no expectation.
        let expect = Expectation::Literal(Value::Bool(true));
        Self {
            schema,
            subject,
            expect,
        }
    }

    /// Expected value (or predicate) at the subject path.
    pub fn is(mut self, expect: impl Into<Expectation>) -> Self {
        self.expect = expect.into();
        self
    }

    /// Register the rule. The fragment's fields are normalized and linted
    /// now, and any issue rejects the rule with [`SchemaError::Definition`].
    /// Local `$defs` are not allowed in a fragment.
    pub fn then(self, fragment: SchemaDef) -> Result<&'s mut Schema, SchemaError> {
        if !fragment.defs().is_empty() {
            return Err(SchemaError::InvalidArgument(
                "conditional fragments cannot declare $defs".to_string(),
            ));
        }
        let When {
            schema,
            subject,
            expect,
        } = self;
        schema.push_conditional(subject, expect, &fragment)?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(subject: Subject, expect: Expectation, fields: &[&str]) -> ConditionalRule {
        ConditionalRule {
            subject,
            expect,
            fragment: fields
                .iter()
                .map(|f| (f.to_string(), Descriptor::default()))
                .collect(),
        }
    }

    #[test]
    fn test_path_rules() {
        let input = Value::from(json!({"kind": "small", "meta": {"tags": ["a"]}}));
        let rules = vec![
            rule("kind".into(), "small".into(), &["payload"]),
            rule("kind".into(), "big".into(), &["other"]),
            rule("meta.tags[0]".into(), "a".into(), &["payload", "extra"]),
            rule("missing".into(), Expectation::Absent, &["gone"]),
        ];
        let out = evaluate(&rules, &input);
        assert_eq!(out.get("payload"), Some(&vec![0, 2]));
        assert_eq!(out.get("extra"), Some(&vec![2]));
        assert_eq!(out.get("gone"), Some(&vec![3]));
        assert!(!out.contains_key("other"));
    }

    #[test]
    fn test_predicate_rules_and_panics() {
        let input = Value::from(json!({"n": 4}));
        let whole = Predicate::new(|v| v.get("n").is_some());
        let panicky = Predicate::new(|_| panic!("bad predicate"));
        let at_path = Predicate::new(|v| v.is_null());
        let rules = vec![
            rule(whole.into(), Expectation::Absent, &["a"]),
            rule(panicky.into(), Expectation::Absent, &["b"]),
            rule("nothing".into(), at_path.into(), &["c"]),
        ];
        let out = evaluate(&rules, &input);
        assert!(out.contains_key("a"));
        assert!(!out.contains_key("b"));
        assert!(out.contains_key("c"));
    }
}

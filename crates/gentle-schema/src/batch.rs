//! Batch execution: one action applied across many inputs, with per-item
//! results and one aggregated result.

use std::fmt;
use std::str::FromStr;

use gentle_core::{ErrorEntry, Value};
use serde::Serialize;

use crate::engine::{Sanitized, Schema, ValidationResult};
use crate::error::{Error, SchemaError};
use crate::options::{CallOptions, SchemaOptions};

/// Which entry point a batch (or benchmark) drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchAction {
    #[default]
    Validate,
    Enforce,
    Sanitize,
    Check,
    AssertTypes,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Enforce => "enforce",
            Self::Sanitize => "sanitize",
            Self::Check => "check",
            Self::AssertTypes => "assertTypes",
        }
    }
}

impl fmt::Display for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchAction {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validate" => Ok(Self::Validate),
            "enforce" => Ok(Self::Enforce),
            "sanitize" => Ok(Self::Sanitize),
            "check" => Ok(Self::Check),
            "assertTypes" => Ok(Self::AssertTypes),
            other => Err(SchemaError::InvalidArgument(format!(
                "action must be one of validate,enforce,sanitize,check,assertTypes, received '{other}'"
            ))),
        }
    }
}

/// Outcome of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Report(ValidationResult),
    Sanitized(Sanitized),
    Enforced(Value),
    Checked(bool),
    /// The item raised a validation failure.
    Failed(Vec<ErrorEntry>),
}

impl BatchItem {
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Report(report) => report.valid,
            Self::Sanitized(sanitized) => sanitized.is_clean(),
            Self::Enforced(_) => true,
            Self::Checked(ok) => *ok,
            Self::Failed(_) => false,
        }
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        match self {
            Self::Report(report) => &report.errors,
            Self::Sanitized(sanitized) => &sanitized.errors,
            Self::Failed(errors) => errors,
            Self::Enforced(_) | Self::Checked(_) => &[],
        }
    }

    /// The value this item contributes to the aggregate, if any.
    fn value(&self) -> Option<&Value> {
        match self {
            Self::Report(report) => Some(&report.value),
            Self::Sanitized(sanitized) => Some(&sanitized.value),
            Self::Enforced(value) => Some(value),
            Self::Checked(_) | Self::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub results: Vec<BatchItem>,
    /// Combined validity, all item errors in order, and the item values as
    /// an array.
    pub aggregated: ValidationResult,
}

impl Schema {
    /// Apply `action` to every item. Under fail-fast the batch stops at the
    /// first invalid item. A non-object item fails the whole batch.
    pub fn batch(
        &self,
        items: &[Value],
        action: BatchAction,
        call: &CallOptions,
    ) -> Result<BatchReport, Error> {
        let options = self.options().overlay(call);
        let mut results = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        let mut values = Vec::new();
        let mut valid = true;

        for item in items {
            let outcome = self.run_action(item, action, &options)?;
            if let Some(value) = outcome.value() {
                values.push(value.clone());
            }
            let item_valid = outcome.is_valid();
            errors.extend(outcome.errors().iter().cloned());
            results.push(outcome);
            if !item_valid {
                valid = false;
                if options.fail_fast {
                    break;
                }
            }
        }

        Ok(BatchReport {
            results,
            aggregated: ValidationResult {
                valid,
                errors,
                value: Value::Array(values),
            },
        })
    }

    /// Run one action on one input. Raised validation failures become
    /// [`BatchItem::Failed`]; anything else propagates.
    pub(crate) fn run_action(
        &self,
        input: &Value,
        action: BatchAction,
        options: &SchemaOptions,
    ) -> Result<BatchItem, Error> {
        let outcome = match action {
            BatchAction::Validate => self.validate_under(input, options).map(BatchItem::Report),
            BatchAction::Enforce => self.enforce_under(input, options).map(BatchItem::Enforced),
            BatchAction::Sanitize => self.sanitize_under(input, options).map(BatchItem::Sanitized),
            BatchAction::Check => self.check_under(input, options).map(BatchItem::Checked),
            BatchAction::AssertTypes => self
                .assert_types_under(input, options)
                .map(BatchItem::Report),
        };
        match outcome {
            Err(Error::Validation(raised)) => Ok(BatchItem::Failed(raised.errors)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gentle_core::ErrorCode;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_json(
            json!({"name": {"type": "string", "required": true}, "n": "number"}),
            SchemaOptions::default(),
        )
        .unwrap()
    }

    fn items() -> Vec<Value> {
        vec![
            Value::from(json!({"name": "a", "n": 1})),
            Value::from(json!({"n": "x"})),
            Value::from(json!({"name": "c"})),
        ]
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in [
            BatchAction::Validate,
            BatchAction::Enforce,
            BatchAction::Sanitize,
            BatchAction::Check,
            BatchAction::AssertTypes,
        ] {
            assert_eq!(action.as_str().parse::<BatchAction>().unwrap(), action);
        }
        assert!("explode".parse::<BatchAction>().is_err());
    }

    #[test]
    fn test_validate_aggregates_every_item() {
        let report = schema().batch(&items(), BatchAction::Validate, &CallOptions::new()).unwrap();
        assert_eq!(report.results.len(), 3);
        assert!(!report.aggregated.valid);
        let codes: Vec<ErrorCode> = report.aggregated.errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::Type, ErrorCode::Required]);
        assert_eq!(report.aggregated.value.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_fail_fast_stops_at_first_invalid_item() {
        let call = CallOptions::new().fail_fast(true);
        let report = schema().batch(&items(), BatchAction::Validate, &call).unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.aggregated.errors.len(), 1);
    }

    #[test]
    fn test_enforce_failures_become_items() {
        let report = schema().batch(&items(), BatchAction::Enforce, &CallOptions::new()).unwrap();
        assert!(matches!(report.results[1], BatchItem::Failed(_)));
        assert!(report.results[0].is_valid());
        // Failed items contribute errors but no value.
        assert_eq!(report.aggregated.value.as_array().map(Vec::len), Some(2));
        assert_eq!(report.aggregated.errors.len(), 2);
    }

    #[test]
    fn test_check_adds_no_errors() {
        let report = schema().batch(&items(), BatchAction::Check, &CallOptions::new()).unwrap();
        assert_eq!(
            report.results,
            vec![BatchItem::Checked(true), BatchItem::Checked(false), BatchItem::Checked(true)]
        );
        assert!(!report.aggregated.valid);
        assert!(report.aggregated.errors.is_empty());
    }

    #[test]
    fn test_non_object_item_propagates() {
        let err = schema()
            .batch(&[Value::from(1)], BatchAction::Sanitize, &CallOptions::new())
            .unwrap_err();
        assert_eq!(err, Error::InvalidInput("number"));
    }
}

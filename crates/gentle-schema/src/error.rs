//! # Schema and Validation Errors
//!
//! Two families that are never conflated:
//!
//! - [`SchemaError`]: the schema itself is unusable. Raised once, at
//!   construction (or by a registry operation), as one aggregated batch.
//! - [`ValidationError`]: an input failed an otherwise valid schema and
//!   the caller asked for a raised failure (`throw` fields, `enforce`,
//!   fail-fast under `valueOnly`).
//!
//! Validation entry points return the umbrella [`Error`].

use std::fmt;

use gentle_core::{ErrorCode, ErrorEntry, Value};
use thiserror::Error;

/// One construction-time schema defect.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIssue {
    /// Field path inside the definition (`user.properties.age`).
    pub path: String,
    pub message: String,
    pub code: ErrorCode,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.code, self.message)
    }
}

/// Ordered collection of schema issues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Issues(pub Vec<SchemaIssue>);

impl Issues {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.0.iter()
    }

    /// Codes of every issue, in order.
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.0.iter().map(|issue| issue.code).collect()
    }
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

/// The schema (or a registry operation on it) is unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Aggregated construction-time defects.
    #[error("schema error:\n{0}")]
    Definition(Issues),

    /// One or more reference names are already registered.
    #[error("refs already exist: {}", .0.join(", "))]
    DuplicateRefs(Vec<String>),

    /// A malformed argument (empty ref name, non-object fragment, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration or definition document could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

impl SchemaError {
    /// Issues carried by a [`SchemaError::Definition`], empty otherwise.
    pub fn issues(&self) -> &[SchemaIssue] {
        match self {
            Self::Definition(issues) => &issues.0,
            _ => &[],
        }
    }
}

impl From<SchemaIssue> for SchemaError {
    fn from(issue: SchemaIssue) -> Self {
        Self::Definition(Issues(vec![issue]))
    }
}

/// Validation failed and the failure was raised rather than returned.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("validation failed:\n{}", render_entries(.errors))]
pub struct ValidationError {
    pub errors: Vec<ErrorEntry>,
    /// Value assembled up to the failure. `None` when the failing field
    /// had nothing to contribute (e.g. an absent required field).
    pub partial_value: Option<Value>,
}

impl ValidationError {
    pub fn new(errors: Vec<ErrorEntry>, partial_value: Option<Value>) -> Self {
        Self {
            errors,
            partial_value,
        }
    }

    /// Codes of every entry, in order.
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }
}

fn render_entries(entries: &[ErrorEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Umbrella error for validation entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The top-level input is not a keyed structure.
    #[error("input must be an object, received {0}")]
    InvalidInput(&'static str),
}

impl Error {
    /// The raised validation failure, if that is what this is.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}

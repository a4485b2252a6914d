//! # Error Types — Codes, Entries, and Core Failures
//!
//! Every failure the engine reports carries one [`ErrorCode`]. Codes fall
//! into two taxonomies that are never mixed:
//!
//! - **Definition codes** (`ERR_SCHEMA_*`, `ERR_REGEX_TOO_LONG`) describe a
//!   malformed schema and are raised once, at construction.
//! - **Validation codes** describe input that does not satisfy an otherwise
//!   valid schema and are collected per field into [`ErrorEntry`] lists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of error codes surfaced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A required field is absent and has no default.
    #[serde(rename = "ERR_REQUIRED")]
    Required,
    /// A null value where nulls are not permitted.
    #[serde(rename = "ERR_NULL")]
    Null,
    /// The value does not match the declared type.
    #[serde(rename = "ERR_TYPE")]
    Type,
    /// Coercion toward a core primitive type failed.
    #[serde(rename = "ERR_COERCE")]
    Coerce,
    /// The value is not one of the allowed enum members.
    #[serde(rename = "ERR_ENUM")]
    Enum,
    /// The value does not follow the declared pattern, or the pattern is unusable.
    #[serde(rename = "ERR_REGEX")]
    Regex,
    /// Below the lower bound (value or length).
    #[serde(rename = "ERR_MIN")]
    Min,
    /// Above the upper bound (value or length).
    #[serde(rename = "ERR_MAX")]
    Max,
    /// A key that the schema does not declare, under strict mode.
    #[serde(rename = "ERR_UNKNOWN")]
    Unknown,
    /// A custom validator rejected the value.
    #[serde(rename = "ERR_CUSTOM")]
    Custom,
    /// A `$ref` could not be resolved (missing or cyclic).
    #[serde(rename = "ERR_REF_UNRESOLVED")]
    RefUnresolved,
    /// A `$ref` resolved to a definition that failed to normalize.
    #[serde(rename = "ERR_REF_NORMALIZE")]
    RefNormalize,
    /// Generic validation failure with no more specific code.
    #[serde(rename = "ERR_VALIDATION")]
    Validation,
    /// Unknown type name or non-type value in a `type` slot.
    #[serde(rename = "ERR_SCHEMA_TYPE")]
    SchemaType,
    /// A `regex` slot that is not a usable pattern.
    #[serde(rename = "ERR_SCHEMA_REGEX")]
    SchemaRegex,
    /// An `enum` slot that is not a sequence.
    #[serde(rename = "ERR_SCHEMA_ENUM")]
    SchemaEnum,
    /// A `properties` slot that is not a keyed structure.
    #[serde(rename = "ERR_SCHEMA_PROPERTIES")]
    SchemaProperties,
    /// A pattern string longer than the configured maximum.
    #[serde(rename = "ERR_REGEX_TOO_LONG")]
    RegexTooLong,
}

impl ErrorCode {
    /// Every code, validation codes first.
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::Required,
            Self::Null,
            Self::Type,
            Self::Coerce,
            Self::Enum,
            Self::Regex,
            Self::Min,
            Self::Max,
            Self::Unknown,
            Self::Custom,
            Self::RefUnresolved,
            Self::RefNormalize,
            Self::Validation,
            Self::SchemaType,
            Self::SchemaRegex,
            Self::SchemaEnum,
            Self::SchemaProperties,
            Self::RegexTooLong,
        ]
    }

    /// The `ERR_*` identifier. Matches the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "ERR_REQUIRED",
            Self::Null => "ERR_NULL",
            Self::Type => "ERR_TYPE",
            Self::Coerce => "ERR_COERCE",
            Self::Enum => "ERR_ENUM",
            Self::Regex => "ERR_REGEX",
            Self::Min => "ERR_MIN",
            Self::Max => "ERR_MAX",
            Self::Unknown => "ERR_UNKNOWN",
            Self::Custom => "ERR_CUSTOM",
            Self::RefUnresolved => "ERR_REF_UNRESOLVED",
            Self::RefNormalize => "ERR_REF_NORMALIZE",
            Self::Validation => "ERR_VALIDATION",
            Self::SchemaType => "ERR_SCHEMA_TYPE",
            Self::SchemaRegex => "ERR_SCHEMA_REGEX",
            Self::SchemaEnum => "ERR_SCHEMA_ENUM",
            Self::SchemaProperties => "ERR_SCHEMA_PROPERTIES",
            Self::RegexTooLong => "ERR_REGEX_TOO_LONG",
        }
    }

    /// Whether this code describes a defect in the schema itself rather
    /// than in the validated input.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaType
                | Self::SchemaRegex
                | Self::SchemaEnum
                | Self::SchemaProperties
                | Self::RegexTooLong
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| CoreError::UnknownErrorCode(s.to_string()))
    }
}

/// One validation failure, located by path.
///
/// `message` always reads `Invalid <path> field. <reason>`. When the field
/// carries a fixed error message, that text replaces the reason and the
/// generated reason is kept in `detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    /// Dot-for-key, bracket-for-index path from the root (or configured prefix).
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Generated reason, present only when a fixed message replaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Text of the underlying failure (validator error, coercion error, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_error: Option<String>,
}

impl ErrorEntry {
    /// Build an entry from a path, a reason, and a code.
    pub fn new(path: impl Into<String>, reason: impl AsRef<str>, code: ErrorCode) -> Self {
        let path = path.into();
        let message = format!("Invalid {path} field. {}", reason.as_ref());
        Self {
            path,
            message,
            code,
            detail: None,
            raw_error: None,
        }
    }

    /// Build an entry whose reason is replaced by a fixed message.
    pub fn with_fixed_message(
        path: impl Into<String>,
        fixed: &str,
        reason: impl Into<String>,
        code: ErrorCode,
    ) -> Self {
        let mut entry = Self::new(path, fixed, code);
        entry.detail = Some(reason.into());
        entry
    }

    /// Attach the text of an underlying failure.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_error = Some(raw.into());
        self
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root) [{}]: {}", self.code, self.message)
        } else {
            write!(f, "{} [{}]: {}", self.path, self.code, self.message)
        }
    }
}

/// Failures raised by the core crate itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// An `ERR_*` identifier that is not part of the taxonomy.
    #[error("unknown error code: {0:?}")]
    UnknownErrorCode(String),

    /// A type name outside the closed tag set.
    #[error("unknown type tag: {0:?}")]
    UnknownTypeTag(String),
}

//! # gentle-schema — Schema Compilation & Validation Engine
//!
//! Compiles a declarative schema definition into per-field checkers and
//! validates arbitrary [`Value`] trees against it, optionally coercing
//! toward the declared types, and producing either a normalized value or
//! an ordered list of [`ErrorEntry`] records.
//!
//! ## Pipeline
//!
//! - [`raw`]: the accepted shorthands ([`RawDef`], [`RawEntry`],
//!   [`SchemaDef`]), built in code or loaded from JSON/YAML.
//! - [`normalize`]: shorthand to canonical [`Descriptor`], with
//!   construction-time linting.
//! - `checker`: compiled validation routine per descriptor; nested `$ref`
//!   slots resolve lazily, which is how recursive shapes work.
//! - [`refs`]: external registry, local `$defs` and raw path lookup.
//! - [`conditional`] and `merge`: `when(..).is(..).then(..)` rules and the
//!   fragment merger behind override checkers.
//! - [`engine`]: the [`Schema`] instance and its entry points.
//!
//! [`batch`], [`bench`] and [`stats`] are thin instrumentation around the
//! engine.
//!
//! ## Crate Policy
//!
//! - Depends only on `gentle-core` internally.
//! - Schema defects surface once, at construction, as one aggregated
//!   [`SchemaError`]. Input defects surface per call as error entries, or
//!   as a raised [`ValidationError`] when the caller asked for one.
//! - Host callbacks never unwind through the engine.
//! - Logging goes through `tracing`; no subscriber is installed here.

pub mod batch;
pub mod bench;
mod checker;
pub mod conditional;
pub mod descriptor;
pub mod engine;
pub mod error;
mod merge;
pub mod normalize;
pub mod options;
pub mod raw;
pub mod refs;
pub mod stats;
pub mod validator;

pub use batch::{BatchAction, BatchItem, BatchReport};
pub use bench::{BenchOptions, BenchReport, ProfileOptions, ProfileReport, ProfileSample};
pub use conditional::{Expectation, Subject, When};
pub use descriptor::{DefaultValue, Descriptor, EnumMember, FieldDescriptor, RegexRule};
pub use engine::{Sanitized, Schema, Validated, ValidationResult};
pub use error::{Error, Issues, SchemaError, SchemaIssue, ValidationError};
pub use normalize::normalize;
pub use options::{CallOptions, SchemaOptions, DEFAULT_MAX_REGEX_LENGTH};
pub use raw::{RawAttr, RawDef, RawEntry, SchemaDef, SharedDef};
pub use refs::{RefFailure, RefOrigin};
pub use stats::FieldStats;
pub use validator::{Predicate, Producer, Validator, ValidatorContext, Verdict};

pub use gentle_core::{
    ErrorCode, ErrorEntry, ExternalType, ExternalValue, Object, Pattern, TypeSpec, TypeTag, Value,
};

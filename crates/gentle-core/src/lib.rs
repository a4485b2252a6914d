//! # gentle-core — Foundational Types for the Gentle Schema Engine
//!
//! Leaf crate of the workspace. Everything here is independent of how a
//! schema is declared or compiled:
//!
//! - [`value`]: the runtime [`Value`] model validated by the engine,
//!   including non-JSON kinds (dates, patterns, maps, sets, URLs, big
//!   integers, buffers, host objects).
//! - [`types`]: the closed [`TypeTag`] set, host-registered
//!   [`ExternalType`]s, and type matching.
//! - [`coerce`]: best-effort conversion toward a declared type.
//! - [`path`]: dotted/bracketed path parsing and lookup.
//! - [`error`]: the [`ErrorCode`] taxonomy and the [`ErrorEntry`] record.
//!
//! ## Crate Policy
//!
//! - No internal dependencies.
//! - Host callbacks (matchers, converters) never unwind through this crate.

pub mod coerce;
pub mod error;
pub mod path;
pub mod types;
pub mod value;

pub use coerce::{coerce, CoercionError};
pub use error::{CoreError, ErrorCode, ErrorEntry};
pub use path::Segment;
pub use types::{ExternalType, TypeSpec, TypeTag};
pub use value::{format_number, ExternalValue, Object, Pattern, Value};

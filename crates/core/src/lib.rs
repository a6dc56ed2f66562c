//! Core types for Vantage
//!
//! This crate defines the foundational vocabulary used throughout the system:
//! - Value: canonical value enum for document fields, view keys, and emissions
//! - collate/SortKey: total cross-type ordering for view keys
//! - Document, DocId, DocChange: the document model and store-side boundary
//! - Emission: one (key, value) pair produced by a view's extraction rule
//! - Error: layered error taxonomy
//! - Limits: engine resource bounds (emission cap)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collate;
pub mod document;
pub mod error;
pub mod limits;
pub mod value;

pub use collate::{collate, SortKey};
pub use document::{DocChange, DocId, Document, Emission, Fields};
pub use error::{
    Error, ExtractionError, IndexError, QueryError, RegistrationError, Result,
};
pub use limits::Limits;
pub use value::Value;

//! View definitions, registry, and extraction execution
//!
//! A view is a named, registered extraction rule (plus an optional reduce)
//! defining one secondary index:
//! - definition: EntityFilter, MapFn, Reduce, ViewDefinition + builder
//! - registry: insert-once name-keyed registry with entity fan-out lookup
//! - executor: runs one rule against one document, isolating rule failures
//!
//! Rule bodies are user-supplied data, not engine logic. The executor
//! sandboxes them against unbounded emission (cap) and converts panics into
//! recoverable errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod definition;
pub mod executor;
pub mod registry;

pub use definition::{CombineFn, EntityFilter, MapFn, Reduce, ViewBuilder, ViewDefinition};
pub use executor::{execute, Emitter};
pub use registry::ViewRegistry;

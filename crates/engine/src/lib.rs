//! View maintenance engine for Vantage
//!
//! This crate orchestrates the lower layers:
//! - ViewEngine: registration, change fan-out, entity immutability
//! - Maintenance: one worker per index (single-writer discipline),
//!   retry with backoff, revision watermark barrier
//! - Aggregation: group-level reduce over index ranges
//! - Query: equality/range/reduce dispatch over snapshots
//!
//! The engine is the only component that knows about cross-layer
//! coordination: extraction runs stateless and parallel, the index patch
//! step is the serialization point, and queries read snapshots only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod maintenance;
pub mod query;
pub mod reduce;

pub use config::{EngineConfig, RetryConfig};
pub use engine::ViewEngine;
pub use maintenance::{ViewStats, ViewStatsSnapshot};
pub use query::{Cursor, Page, RangeSpec, Row};
pub use reduce::reduce_range;

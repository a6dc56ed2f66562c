//! Per-view sorted index store with incremental maintenance
//!
//! One [`IndexStore`] holds the materialized entries of one view:
//! - a sorted entry arena (`BTreeMap` keyed by collated view key, with
//!   per-key posting lists ordered by document id and sequence number)
//! - per-document emission bookkeeping ("the index into the index") that
//!   makes incremental patching possible
//!
//! All mutation flows through the single [`IndexStore::apply`] entry point.
//! Readers take consistent [`IndexSnapshot`]s and never observe a partially
//! patched state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod snapshot;
pub mod store;

pub use entry::{Posting, PostingList, TouchedRange};
pub use snapshot::{IndexSnapshot, ScanEntry};
pub use store::{IndexStats, IndexStore};

//! Index entry types
//!
//! Entries are stored as posting lists per collated key. Within one key,
//! postings are ordered by `(doc_id, seq)`: the sequence number is assigned
//! at insertion from a per-index monotonic counter, so a document emitting
//! the same key (even the same key and value) twice produces two distinct
//! entries, and repeated identical-key emissions keep stable insertion
//! order.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use vantage_core::{collate, DocId, SortKey, Value};

/// Postings under one key. Most keys have one or two contributors, so the
/// list is inline-allocated for the common case.
pub type PostingList = SmallVec<[Posting; 2]>;

/// The sorted entry arena: collated key to ordered postings.
pub(crate) type EntryTree = BTreeMap<SortKey, PostingList>;

/// One index entry under a key: the contributing document, its sequence
/// number, and the emitted value.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Contributing document id (secondary sort within a key).
    pub doc_id: DocId,
    /// Insertion sequence number (tertiary sort; unique per index).
    pub seq: u64,
    /// The emitted value (Null when the rule emitted none).
    pub value: Value,
}

impl Posting {
    /// Ordering of postings within one key: by doc id, then sequence.
    pub fn cmp_position(&self, doc_id: &DocId, seq: u64) -> Ordering {
        self.doc_id.cmp(doc_id).then(self.seq.cmp(&seq))
    }
}

/// The smallest key range touched by one `apply` patch (both ends
/// inclusive). Re-aggregation after a patch only needs to recompute over
/// this range, not the whole index.
#[derive(Debug, Clone)]
pub struct TouchedRange {
    /// Lowest changed key.
    pub low: Value,
    /// Highest changed key.
    pub high: Value,
}

impl TouchedRange {
    /// Widen the range to cover `key`.
    pub fn widen(&mut self, key: &Value) {
        if collate(key, &self.low) == Ordering::Less {
            self.low = key.clone();
        }
        if collate(key, &self.high) == Ordering::Greater {
            self.high = key.clone();
        }
    }

    /// A range covering exactly one key.
    pub fn point(key: &Value) -> Self {
        TouchedRange {
            low: key.clone(),
            high: key.clone(),
        }
    }
}

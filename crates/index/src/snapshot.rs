//! IndexSnapshot: consistent point-in-time view of one index
//!
//! A snapshot is an `Arc`-shared clone of the entry tree taken under the
//! store's lock. Once created it never changes, so readers can range-scan
//! and reduce without holding any lock, and never observe a partially
//! patched state mid-`apply`.
//!
//! # Design Notes
//!
//! - **Clone on first read**: the store caches the snapshot and invalidates
//!   the cache on write, so read-heavy periods share one clone.
//! - **Lazy scans**: `scan` returns an iterator; consumers can stop (or be
//!   cancelled) mid-iteration. Continuation across pages restarts from a
//!   `(key, doc_id, seq)` position, so no scan holds a snapshot hostage.

use crate::entry::EntryTree;
use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;
use vantage_core::{collate, DocId, SortKey, Value};

/// One entry yielded by a scan, borrowing from the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ScanEntry<'a> {
    /// The collated view key.
    pub key: &'a Value,
    /// Contributing document id.
    pub doc_id: &'a DocId,
    /// Insertion sequence number (tie-break within equal keys).
    pub seq: u64,
    /// The emitted value.
    pub value: &'a Value,
}

/// Immutable point-in-time view of one index's entries.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    entries: Arc<EntryTree>,
}

impl IndexSnapshot {
    pub(crate) fn new(entries: Arc<EntryTree>) -> Self {
        IndexSnapshot { entries }
    }

    /// Total number of entries in the snapshot.
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(|list| list.len()).sum()
    }

    /// Whether the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact-key lookup: `(doc_id, value)` pairs in stable emission order.
    pub fn lookup(&self, key: &Value) -> Vec<(DocId, Value)> {
        self.entries
            .get(&SortKey(key.clone()))
            .map(|list| {
                list.iter()
                    .map(|p| (p.doc_id.clone(), p.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lazy range scan in key order (reverse key order when `descending`).
    ///
    /// Each end of the range is independently inclusive, exclusive, or
    /// unbounded. An inverted range yields an empty iterator; callers that
    /// want an error for that case validate before scanning.
    pub fn scan<'a>(
        &'a self,
        start: Bound<&Value>,
        end: Bound<&Value>,
        descending: bool,
    ) -> Box<dyn Iterator<Item = ScanEntry<'a>> + 'a> {
        if range_is_empty(&start, &end) {
            return Box::new(std::iter::empty());
        }
        let bounds = (own_bound(start), own_bound(end));
        let range = self.entries.range(bounds);
        if descending {
            Box::new(range.rev().flat_map(|(key, list)| {
                list.iter().rev().map(move |p| ScanEntry {
                    key: key.value(),
                    doc_id: &p.doc_id,
                    seq: p.seq,
                    value: &p.value,
                })
            }))
        } else {
            Box::new(range.flat_map(|(key, list)| {
                list.iter().map(move |p| ScanEntry {
                    key: key.value(),
                    doc_id: &p.doc_id,
                    seq: p.seq,
                    value: &p.value,
                })
            }))
        }
    }
}

fn own_bound(b: Bound<&Value>) -> Bound<SortKey> {
    match b {
        Bound::Included(v) => Bound::Included(SortKey(v.clone())),
        Bound::Excluded(v) => Bound::Excluded(SortKey(v.clone())),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Whether the bound pair denotes an empty (or inverted) range.
/// `BTreeMap::range` panics on inverted bounds, so this is checked first.
fn range_is_empty(start: &Bound<&Value>, end: &Bound<&Value>) -> bool {
    let (s, e) = match (start, end) {
        (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
            (s, e)
        }
        _ => return false,
    };
    match collate(s, e) {
        Ordering::Greater => true,
        Ordering::Equal => {
            matches!(start, Bound::Excluded(_)) || matches!(end, Bound::Excluded(_))
        }
        Ordering::Less => false,
    }
}

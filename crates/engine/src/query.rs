//! Range queries with pagination over index snapshots
//!
//! A [`RangeSpec`] describes a key range in collation order: optional
//! start/end bounds (inclusive or exclusive), scan direction, a row limit,
//! and an optional resume [`Cursor`]. Execution walks the snapshot lazily
//! and stops as soon as the limit is reached, returning a [`Page`] whose
//! cursor (if any) resumes exactly after the last row — cursors are keyed
//! by `(key, doc_id, seq)` so duplicate keys and even duplicate
//! `(key, doc_id)` pairs paginate without skips or repeats.

use std::cmp::Ordering;
use std::ops::Bound;
use vantage_core::{collate, DocId, QueryError, Value};
use vantage_index::{IndexSnapshot, ScanEntry};

/// One query result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The view key the row was indexed under.
    pub key: Value,
    /// The document that emitted it.
    pub doc_id: DocId,
    /// The emitted value.
    pub value: Value,
}

/// Opaque resume position. Identifies the last row of the previous page.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    key: Value,
    doc_id: DocId,
    seq: u64,
}

/// One page of results plus the cursor to fetch the next page, if more
/// rows remain.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Rows in scan order.
    pub rows: Vec<Row>,
    /// Resume cursor, present only when the range has more rows.
    pub next: Option<Cursor>,
}

/// A key range query in collation order.
#[derive(Debug, Clone)]
pub struct RangeSpec {
    start: Bound<Value>,
    end: Bound<Value>,
    descending: bool,
    limit: Option<usize>,
    cursor: Option<Cursor>,
}

impl Default for RangeSpec {
    fn default() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
            descending: false,
            limit: None,
            cursor: None,
        }
    }
}

impl RangeSpec {
    /// The full key space.
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
            ..Self::default()
        }
    }

    /// Exactly one key (equality lookup as a range).
    pub fn key(key: impl Into<Value>) -> Self {
        let key = key.into();
        Self {
            start: Bound::Included(key.clone()),
            end: Bound::Included(key),
            ..Self::default()
        }
    }

    /// An inclusive range `[start, end]`.
    pub fn between(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Included(end.into()),
            ..Self::default()
        }
    }

    /// A range bounded only from below, inclusive.
    pub fn from_key(start: impl Into<Value>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Unbounded,
            ..Self::default()
        }
    }

    /// A range bounded only from above, inclusive.
    pub fn until_key(end: impl Into<Value>) -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Included(end.into()),
            ..Self::default()
        }
    }

    /// Make the start bound exclusive.
    pub fn start_exclusive(mut self) -> Self {
        if let Bound::Included(key) = self.start {
            self.start = Bound::Excluded(key);
        }
        self
    }

    /// Make the end bound exclusive.
    pub fn end_exclusive(mut self) -> Self {
        if let Bound::Included(key) = self.end {
            self.end = Bound::Excluded(key);
        }
        self
    }

    /// Reverse the scan direction.
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Cap the number of rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume after the row identified by a previous page's cursor.
    pub fn after(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Start bound of the range.
    pub fn start_bound(&self) -> Bound<&Value> {
        bound_as_ref(&self.start)
    }

    /// End bound of the range.
    pub fn end_bound(&self) -> Bound<&Value> {
        bound_as_ref(&self.end)
    }

    /// Whether the scan runs high-to-low.
    pub fn is_descending(&self) -> bool {
        self.descending
    }

    /// Reject ranges whose bounds can never contain a key: start sorting
    /// after end, or equal bounds with either side exclusive.
    pub fn validate(&self) -> Result<(), QueryError> {
        let (s, e) = match (&self.start, &self.end) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => return Ok(()),
            (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
                (s, e)
            }
        };
        match collate(s, e) {
            Ordering::Greater => Err(QueryError::InvalidRange),
            Ordering::Equal
                if matches!(self.start, Bound::Excluded(_))
                    || matches!(self.end, Bound::Excluded(_)) =>
            {
                Err(QueryError::InvalidRange)
            }
            _ => Ok(()),
        }
    }
}

fn bound_as_ref(bound: &Bound<Value>) -> Bound<&Value> {
    match bound {
        Bound::Included(v) => Bound::Included(v),
        Bound::Excluded(v) => Bound::Excluded(v),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// True when `entry` lies at or before the cursor position in scan order
/// and must be skipped on a resumed page.
fn at_or_before_cursor(entry: &ScanEntry<'_>, cursor: &Cursor, descending: bool) -> bool {
    match collate(entry.key, &cursor.key) {
        Ordering::Equal => {
            let pos = (entry.doc_id, entry.seq);
            let cur = (&cursor.doc_id, cursor.seq);
            if descending {
                pos >= cur
            } else {
                pos <= cur
            }
        }
        // Keys strictly inside the tightened range are past the cursor.
        _ => false,
    }
}

/// Execute a validated range query against a snapshot.
pub fn execute(snapshot: &IndexSnapshot, spec: &RangeSpec) -> Result<Page, QueryError> {
    spec.validate()?;

    // Tighten the range to the cursor key so the scan skips whole keys
    // already served; rows within the cursor key are filtered per row.
    let mut start = spec.start_bound();
    let mut end = spec.end_bound();
    if let Some(cursor) = &spec.cursor {
        if spec.descending {
            end = Bound::Included(&cursor.key);
        } else {
            start = Bound::Included(&cursor.key);
        }
    }

    let mut rows = Vec::new();
    let mut last: Option<Cursor> = None;
    let mut iter = snapshot.scan(start, end, spec.descending);
    let limit = spec.limit.unwrap_or(usize::MAX);

    let next = loop {
        if rows.len() >= limit {
            // More rows remain iff the iterator is not exhausted.
            break if iter.next().is_some() { last.take() } else { None };
        }
        let Some(entry) = iter.next() else {
            break None;
        };
        if let Some(cursor) = &spec.cursor {
            if at_or_before_cursor(&entry, cursor, spec.descending) {
                continue;
            }
        }
        last = Some(Cursor {
            key: entry.key.clone(),
            doc_id: entry.doc_id.clone(),
            seq: entry.seq,
        });
        rows.push(Row {
            key: entry.key.clone(),
            doc_id: entry.doc_id.clone(),
            value: entry.value.clone(),
        });
    };

    Ok(Page { rows, next })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

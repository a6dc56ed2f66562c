//! IndexStore: one view's mutable index state and its maintenance protocol
//!
//! State is two structures kept exactly in sync:
//! - `entries`: the sorted arena (collated key → ordered posting list)
//! - `emissions`: per-document bookkeeping recording the exact entries each
//!   document currently contributes
//!
//! The core consistency invariant: the flattened bookkeeping equals the
//! arena exactly — no orphaned and no missing entries. [`IndexStore::verify`]
//! re-validates it; a failure poisons the index (fatal for this index only)
//! and a full rebuild is the recovery path.
//!
//! # Incremental maintenance
//!
//! [`IndexStore::apply`] computes the value-sensitive multiset difference
//! between the document's recorded emissions and the new ones. Entries no
//! longer emitted are removed by `(key, doc_id, seq)` identity; entries
//! unchanged between the two sets are left untouched (they keep their
//! sequence numbers); new entries are inserted in sort order. Most writes
//! change a small fraction of a document's emissions, so this is the hot
//! path optimization, not just a nicety.
//!
//! # Concurrency
//!
//! `apply` is a read-modify-write over shared ordered state and must be
//! serialized per index; the store enforces that with a write lock, and the
//! maintenance layer additionally funnels patches through one worker per
//! index. Readers take cached [`IndexSnapshot`]s (see `snapshot.rs`).

use crate::entry::{EntryTree, Posting, PostingList, TouchedRange};
use crate::snapshot::IndexSnapshot;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, error};
use vantage_core::{collate, DocId, Emission, IndexError, SortKey, Value};

/// One recorded emission: what the bookkeeping remembers per document.
#[derive(Debug, Clone)]
struct EmissionRecord {
    key: Value,
    value: Value,
    seq: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: EntryTree,
    emissions: FxHashMap<DocId, Vec<EmissionRecord>>,
    next_seq: u64,
    /// Cached snapshot, invalidated by any effective write.
    cache: Option<IndexSnapshot>,
}

/// Counters for one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    /// Total entries currently indexed.
    pub entries: usize,
    /// Documents currently contributing entries.
    pub documents: usize,
    /// Patches applied since creation (or last clear).
    pub patches_applied: u64,
}

/// The mutable index of one view.
#[derive(Debug)]
pub struct IndexStore {
    name: String,
    state: RwLock<IndexState>,
    poisoned: AtomicBool,
    patches: AtomicU64,
}

impl IndexStore {
    /// Create an empty index for the named view.
    pub fn new(name: impl Into<String>) -> Self {
        IndexStore {
            name: name.into(),
            state: RwLock::new(IndexState::default()),
            poisoned: AtomicBool::new(false),
            patches: AtomicU64::new(0),
        }
    }

    /// The owning view's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a detected corruption has made this index unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(AtomicOrdering::Acquire)
    }

    /// Replace the document's contribution with `new_emissions`.
    ///
    /// The previous contribution is the bookkeeping recorded by the last
    /// `apply` for this document (empty if none). Passing an empty slice
    /// deletes the document from the index. Returns the smallest touched
    /// key range, or None for a no-op patch. Idempotent: re-applying the
    /// same emissions changes nothing.
    pub fn apply(
        &self,
        doc_id: &DocId,
        new_emissions: &[Emission],
    ) -> Result<Option<TouchedRange>, IndexError> {
        if self.is_poisoned() {
            return Err(IndexError::Unusable {
                view: self.name.clone(),
            });
        }

        let mut guard = self.state.write();
        let state = &mut *guard;
        let previous = state.emissions.remove(doc_id).unwrap_or_default();

        // Value-sensitive multiset of the new emissions, keyed by collated
        // (key, value) pairs.
        let mut wanted: BTreeMap<(SortKey, SortKey), usize> = BTreeMap::new();
        for emission in new_emissions {
            *wanted
                .entry((
                    SortKey(emission.key.clone()),
                    SortKey(emission.value.clone()),
                ))
                .or_insert(0) += 1;
        }

        // Pass 1: walk the previous records. Occurrences still wanted are
        // retained together with their sequence numbers; the rest are
        // removed from the arena by (key, doc_id, seq) identity.
        let mut retained: BTreeMap<(SortKey, SortKey), VecDeque<u64>> = BTreeMap::new();
        let mut touched: Option<TouchedRange> = None;
        for record in previous {
            let pair = (
                SortKey(record.key.clone()),
                SortKey(record.value.clone()),
            );
            let keep = match wanted.get_mut(&pair) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    true
                }
                _ => false,
            };
            if keep {
                retained.entry(pair).or_default().push_back(record.seq);
            } else {
                if !remove_posting(&mut state.entries, &record.key, doc_id, record.seq) {
                    self.poison(format!(
                        "bookkeeping holds entry (key {:?}, doc '{}', seq {}) missing from arena",
                        record.key, doc_id, record.seq
                    ));
                    return Err(IndexError::CorruptionDetected {
                        view: self.name.clone(),
                        detail: "recorded entry missing from arena".to_string(),
                    });
                }
                touch(&mut touched, &record.key);
            }
        }

        // Pass 2: walk the new emissions in order. Each occurrence reuses a
        // retained sequence number when one is available (the entry is
        // already in the arena, untouched); otherwise it gets a fresh one
        // and is inserted in sort order.
        let mut records = Vec::with_capacity(new_emissions.len());
        for emission in new_emissions {
            let pair = (
                SortKey(emission.key.clone()),
                SortKey(emission.value.clone()),
            );
            let reused = retained.get_mut(&pair).and_then(VecDeque::pop_front);
            let seq = match reused {
                Some(seq) => seq,
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    insert_posting(
                        &mut state.entries,
                        emission.key.clone(),
                        Posting {
                            doc_id: doc_id.clone(),
                            seq,
                            value: emission.value.clone(),
                        },
                    );
                    touch(&mut touched, &emission.key);
                    seq
                }
            };
            records.push(EmissionRecord {
                key: emission.key.clone(),
                value: emission.value.clone(),
                seq,
            });
        }

        if !records.is_empty() {
            state.emissions.insert(doc_id.clone(), records);
        }
        if touched.is_some() {
            state.cache = None;
        }
        self.patches.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(
            view = self.name.as_str(),
            doc = %doc_id,
            emissions = new_emissions.len(),
            changed = touched.is_some(),
            "patch applied"
        );
        Ok(touched)
    }

    /// Take a consistent snapshot for reading. Cached across reads and
    /// invalidated by writes, so read-heavy periods share one clone.
    pub fn snapshot(&self) -> Result<IndexSnapshot, IndexError> {
        if self.is_poisoned() {
            return Err(IndexError::Unusable {
                view: self.name.clone(),
            });
        }
        {
            let state = self.state.read();
            if let Some(snapshot) = &state.cache {
                return Ok(snapshot.clone());
            }
        }
        let mut state = self.state.write();
        if let Some(snapshot) = &state.cache {
            return Ok(snapshot.clone());
        }
        let snapshot = IndexSnapshot::new(Arc::new(state.entries.clone()));
        state.cache = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Re-validate the core consistency invariant: the flattened
    /// bookkeeping equals the arena exactly. On failure the index is
    /// poisoned and only a rebuild recovers it.
    pub fn verify(&self) -> Result<(), IndexError> {
        let state = self.state.read();
        let recorded: usize = state.emissions.values().map(Vec::len).sum();
        let indexed: usize = state.entries.values().map(PostingList::len).sum();

        let mut fault = if recorded != indexed {
            Some(format!(
                "{recorded} recorded emissions but {indexed} arena entries"
            ))
        } else {
            None
        };

        if fault.is_none() {
            'outer: for (doc_id, records) in &state.emissions {
                for record in records {
                    let found = state
                        .entries
                        .get(&SortKey(record.key.clone()))
                        .and_then(|list| {
                            list.iter()
                                .find(|p| p.cmp_position(doc_id, record.seq) == Ordering::Equal)
                        });
                    let ok = found
                        .map(|p| collate(&p.value, &record.value) == Ordering::Equal)
                        .unwrap_or(false);
                    if !ok {
                        fault = Some(format!(
                            "entry (key {:?}, doc '{}', seq {}) missing or value mismatch",
                            record.key, doc_id, record.seq
                        ));
                        break 'outer;
                    }
                }
            }
        }

        drop(state);
        match fault {
            Some(detail) => {
                self.poison(detail.clone());
                Err(IndexError::CorruptionDetected {
                    view: self.name.clone(),
                    detail,
                })
            }
            None => Ok(()),
        }
    }

    /// Reset all state (used by rebuild). Un-poisons the index.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = IndexState::default();
        self.poisoned.store(false, AtomicOrdering::Release);
        self.patches.store(0, AtomicOrdering::Relaxed);
        debug!(view = self.name.as_str(), "index cleared");
    }

    /// Current counters.
    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            entries: state.entries.values().map(PostingList::len).sum(),
            documents: state.emissions.len(),
            patches_applied: self.patches.load(AtomicOrdering::Relaxed),
        }
    }

    fn poison(&self, detail: String) {
        error!(
            view = self.name.as_str(),
            detail = detail.as_str(),
            "index corruption detected, marking unusable"
        );
        self.poisoned.store(true, AtomicOrdering::Release);
    }
}

/// Remove one posting by `(key, doc_id, seq)` identity.
/// Cleans up the key's slot when its posting list empties.
fn remove_posting(entries: &mut EntryTree, key: &Value, doc_id: &DocId, seq: u64) -> bool {
    let sort_key = SortKey(key.clone());
    let Some(list) = entries.get_mut(&sort_key) else {
        return false;
    };
    let Ok(idx) = list.binary_search_by(|p| p.cmp_position(doc_id, seq)) else {
        return false;
    };
    list.remove(idx);
    if list.is_empty() {
        entries.remove(&sort_key);
    }
    true
}

/// Ordered insertion of one posting (binary search within the key's list).
fn insert_posting(entries: &mut EntryTree, key: Value, posting: Posting) {
    let list = entries
        .entry(SortKey(key))
        .or_insert_with(PostingList::new);
    let at = match list.binary_search_by(|p| p.cmp_position(&posting.doc_id, posting.seq)) {
        Ok(at) | Err(at) => at,
    };
    list.insert(at, posting);
}

fn touch(touched: &mut Option<TouchedRange>, key: &Value) {
    match touched {
        Some(range) => range.widen(key),
        None => *touched = Some(TouchedRange::point(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound;

    fn emissions(pairs: &[(&str, &str)]) -> Vec<Emission> {
        pairs.iter().map(|(k, v)| Emission::new(*k, *v)).collect()
    }

    fn entry_keys(store: &IndexStore) -> Vec<(String, String)> {
        store
            .snapshot()
            .unwrap()
            .scan(Bound::Unbounded, Bound::Unbounded, false)
            .map(|e| {
                (
                    e.key.as_str().unwrap().to_string(),
                    e.doc_id.to_string(),
                )
            })
            .collect()
    }

    // ========================================
    // Single-valued index lifecycle
    // ========================================

    #[test]
    fn test_insert_lookup_delete() {
        let store = IndexStore::new("account/name");
        let d1 = DocId::from("d1");
        store
            .apply(&d1, &emissions(&[("alice", "Alice A.")]))
            .unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(
            snap.lookup(&Value::from("alice")),
            vec![(d1.clone(), Value::from("Alice A."))]
        );

        // Deleting d1 removes the entry
        store.apply(&d1, &[]).unwrap();
        let snap = store.snapshot().unwrap();
        assert!(snap.lookup(&Value::from("alice")).is_empty());
        assert_eq!(store.stats().documents, 0);
        store.verify().unwrap();
    }

    // ========================================
    // Multi-valued fan-out and partial update
    // ========================================

    #[test]
    fn test_partial_update_leaves_unchanged_entries_untouched() {
        let store = IndexStore::new("sample/tag");
        let d3 = DocId::from("d3");
        store
            .apply(&d3, &emissions(&[("qc", "s1"), ("batch1", "s1")]))
            .unwrap();

        let before: Vec<u64> = store
            .snapshot()
            .unwrap()
            .scan(Bound::Unbounded, Bound::Unbounded, false)
            .filter(|e| e.key.as_str() == Some("qc"))
            .map(|e| e.seq)
            .collect();

        // Drop batch1; qc entry keeps its sequence number (untouched)
        let range = store
            .apply(&d3, &emissions(&[("qc", "s1")]))
            .unwrap()
            .expect("batch1 removal touches the index");
        assert_eq!(range.low, Value::from("batch1"));
        assert_eq!(range.high, Value::from("batch1"));

        let snap = store.snapshot().unwrap();
        assert!(snap.lookup(&Value::from("batch1")).is_empty());
        let after: Vec<u64> = snap
            .scan(Bound::Unbounded, Bound::Unbounded, false)
            .filter(|e| e.key.as_str() == Some("qc"))
            .map(|e| e.seq)
            .collect();
        assert_eq!(before, after);
        store.verify().unwrap();
    }

    #[test]
    fn test_value_change_replaces_entry() {
        let store = IndexStore::new("sample/name");
        let d1 = DocId::from("d1");
        store.apply(&d1, &emissions(&[("s1", "projA")])).unwrap();
        store.apply(&d1, &emissions(&[("s1", "projB")])).unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(
            snap.lookup(&Value::from("s1")),
            vec![(d1, Value::from("projB"))]
        );
        assert_eq!(snap.entry_count(), 1);
        store.verify().unwrap();
    }

    #[test]
    fn test_duplicate_emissions_kept_distinct() {
        let store = IndexStore::new("sample/tag");
        let d5 = DocId::from("d5");
        store
            .apply(&d5, &emissions(&[("qc", "s3"), ("qc", "s3")]))
            .unwrap();
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.lookup(&Value::from("qc")).len(), 2);
        store.verify().unwrap();
    }

    // ========================================
    // Idempotence
    // ========================================

    #[test]
    fn test_apply_is_idempotent() {
        let store = IndexStore::new("v");
        let d1 = DocId::from("d1");
        let set = emissions(&[("a", "1"), ("b", "2")]);
        store.apply(&d1, &set).unwrap();
        let first = entry_keys(&store);

        let touched = store.apply(&d1, &set).unwrap();
        assert!(touched.is_none(), "re-apply must be a no-op");
        assert_eq!(entry_keys(&store), first);
        store.verify().unwrap();
    }

    // ========================================
    // Ordering
    // ========================================

    #[test]
    fn test_entries_sorted_by_key_then_doc() {
        let store = IndexStore::new("v");
        store
            .apply(&DocId::from("d2"), &emissions(&[("b", ""), ("a", "")]))
            .unwrap();
        store
            .apply(&DocId::from("d1"), &emissions(&[("b", "")]))
            .unwrap();

        assert_eq!(
            entry_keys(&store),
            vec![
                ("a".to_string(), "d2".to_string()),
                ("b".to_string(), "d1".to_string()),
                ("b".to_string(), "d2".to_string()),
            ]
        );
    }

    #[test]
    fn test_heterogeneous_keys_sort_deterministically() {
        let store = IndexStore::new("all/timestamp");
        store
            .apply(
                &DocId::from("d1"),
                &[Emission::new(Value::Null, ()), Emission::new(7i64, ())],
            )
            .unwrap();
        store
            .apply(&DocId::from("d2"), &[Emission::new("2011-01-01", ())])
            .unwrap();

        let snap = store.snapshot().unwrap();
        let kinds: Vec<&'static str> = snap
            .scan(Bound::Unbounded, Bound::Unbounded, false)
            .map(|e| e.key.type_name())
            .collect();
        assert_eq!(kinds, vec!["Null", "Int", "String"]);
    }

    // ========================================
    // Snapshot isolation
    // ========================================

    #[test]
    fn test_snapshot_isolated_from_later_writes() {
        let store = IndexStore::new("v");
        store
            .apply(&DocId::from("d1"), &emissions(&[("a", "")]))
            .unwrap();
        let snap = store.snapshot().unwrap();
        store
            .apply(&DocId::from("d2"), &emissions(&[("b", "")]))
            .unwrap();
        assert_eq!(snap.entry_count(), 1);
        assert_eq!(store.snapshot().unwrap().entry_count(), 2);
    }

    #[test]
    fn test_snapshot_cache_reused_between_writes() {
        let store = IndexStore::new("v");
        store
            .apply(&DocId::from("d1"), &emissions(&[("a", "")]))
            .unwrap();
        let s1 = store.snapshot().unwrap();
        let s2 = store.snapshot().unwrap();
        // Same underlying Arc until the next write invalidates the cache
        assert_eq!(s1.entry_count(), s2.entry_count());
    }

    // ========================================
    // Corruption and recovery
    // ========================================

    #[test]
    fn test_verify_detects_tampering_and_poisons() {
        let store = IndexStore::new("v");
        let d1 = DocId::from("d1");
        store.apply(&d1, &emissions(&[("a", "x")])).unwrap();

        // Simulate corruption: drop an arena entry behind the bookkeeping's back
        store.state.write().entries.clear();

        let err = store.verify().unwrap_err();
        assert!(matches!(err, IndexError::CorruptionDetected { .. }));
        assert!(store.is_poisoned());

        // Poisoned index refuses reads and writes
        assert!(matches!(
            store.snapshot(),
            Err(IndexError::Unusable { .. })
        ));
        assert!(matches!(
            store.apply(&d1, &[]),
            Err(IndexError::Unusable { .. })
        ));

        // Rebuild path: clear, replay
        store.clear();
        store.apply(&d1, &emissions(&[("a", "x")])).unwrap();
        store.verify().unwrap();
        assert!(!store.is_poisoned());
    }

    #[test]
    fn test_stats() {
        let store = IndexStore::new("v");
        store
            .apply(&DocId::from("d1"), &emissions(&[("a", ""), ("b", "")]))
            .unwrap();
        store
            .apply(&DocId::from("d2"), &emissions(&[("a", "")]))
            .unwrap();
        let stats = store.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.patches_applied, 2);
    }

    // ========================================
    // Order-independence and randomized batches
    // ========================================

    #[test]
    fn test_final_state_independent_of_apply_order() {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let batches: Vec<(DocId, Vec<Emission>)> = (0..8)
            .map(|i| {
                (
                    DocId::from(format!("d{i}")),
                    emissions(&[("a", "x"), ("b", "y")])
                        .into_iter()
                        .chain(std::iter::once(Emission::new(format!("k{i}"), "z")))
                        .collect(),
                )
            })
            .collect();

        let reference = IndexStore::new("v");
        for (doc, batch) in &batches {
            reference.apply(doc, batch).unwrap();
        }
        let expected: Vec<_> = reference
            .snapshot()
            .unwrap()
            .scan(Bound::Unbounded, Bound::Unbounded, false)
            .map(|e| (e.key.clone(), e.doc_id.clone(), e.value.clone()))
            .collect();

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for _ in 0..4 {
            let mut shuffled = batches.clone();
            shuffled.shuffle(&mut rng);
            let store = IndexStore::new("v");
            for (doc, batch) in &shuffled {
                store.apply(doc, batch).unwrap();
            }
            let got: Vec<_> = store
                .snapshot()
                .unwrap()
                .scan(Bound::Unbounded, Bound::Unbounded, false)
                .map(|e| (e.key.clone(), e.doc_id.clone(), e.value.clone()))
                .collect();
            // Sequence numbers differ between orders; positions and rows
            // must not.
            assert_eq!(got, expected);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn batch_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
            prop::collection::vec(("[a-d]{1,3}", "[x-z]{0,2}"), 0..8)
        }

        proptest! {
            // The entries attributable to a document always equal its most
            // recent batch, through any sequence of re-applies.
            #[test]
            fn prop_latest_batch_wins(
                batches in prop::collection::vec(batch_strategy(), 1..6),
            ) {
                let store = IndexStore::new("v");
                let doc = DocId::from("d1");
                for batch in &batches {
                    let batch: Vec<Emission> = batch
                        .iter()
                        .map(|(k, v)| Emission::new(k.as_str(), v.as_str()))
                        .collect();
                    store.apply(&doc, &batch).unwrap();
                }
                let last = batches.last().unwrap();
                let snapshot = store.snapshot().unwrap();
                prop_assert_eq!(snapshot.entry_count(), last.len());

                let mut indexed: Vec<(String, String)> = snapshot
                    .scan(Bound::Unbounded, Bound::Unbounded, false)
                    .map(|e| {
                        (
                            e.key.as_str().unwrap().to_string(),
                            e.value.as_str().unwrap().to_string(),
                        )
                    })
                    .collect();
                let mut expected = last.clone();
                indexed.sort();
                expected.sort();
                prop_assert_eq!(indexed, expected);
                store.verify().unwrap();
            }

            #[test]
            fn prop_reapply_is_identity(batch in batch_strategy()) {
                let store = IndexStore::new("v");
                let doc = DocId::from("d1");
                let batch: Vec<Emission> = batch
                    .iter()
                    .map(|(k, v)| Emission::new(k.as_str(), v.as_str()))
                    .collect();
                store.apply(&doc, &batch).unwrap();
                let touched = store.apply(&doc, &batch).unwrap();
                prop_assert!(touched.is_none());
                prop_assert_eq!(store.snapshot().unwrap().entry_count(), batch.len());
            }
        }
    }
}

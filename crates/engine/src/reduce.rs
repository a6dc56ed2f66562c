//! Group-level aggregation over index ranges
//!
//! A reduce query folds the values of a key range into one result per
//! group. The group of a row is derived from its key and the requested
//! `group_level`:
//! - level 0 collapses the whole range into a single group keyed `Null`,
//! - for array keys, level N groups by the first N components,
//! - scalar keys group by the whole key at any level >= 1.
//!
//! Rows arrive in collation order, so equal groups are contiguous and a
//! single forward pass suffices. Within a group, values are folded in
//! chunks: each full chunk is reduced to a partial, and partials are
//! combined in order. Built-in combiners (`Count`, `Sum`) are associative,
//! and custom combiners are required to be, so chunking never changes the
//! result.

use std::ops::Bound;
use vantage_core::Value;
use vantage_index::IndexSnapshot;
use vantage_views::Reduce;

/// Derive the grouping key for a row key at the given level.
fn group_key(key: &Value, group_level: usize) -> Value {
    if group_level == 0 {
        return Value::Null;
    }
    match key {
        Value::Array(parts) => {
            let taken = parts.len().min(group_level);
            Value::Array(parts[..taken].to_vec())
        }
        other => other.clone(),
    }
}

/// Add two numeric values, promoting to `Float` on overflow or when
/// either side is already a float. Non-numeric operands contribute
/// nothing (the other side wins).
fn numeric_add(acc: Value, v: &Value) -> Value {
    match (acc, v) {
        (Value::Int(a), Value::Int(b)) => match a.checked_add(*b) {
            Some(sum) => Value::Int(sum),
            None => Value::Float(a as f64 + *b as f64),
        },
        (Value::Int(a), Value::Float(b)) => Value::Float(a as f64 + b),
        (Value::Float(a), Value::Int(b)) => Value::Float(a + *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (acc @ (Value::Int(_) | Value::Float(_)), _) => acc,
        (_, Value::Int(_) | Value::Float(_)) => v.clone(),
        (acc, _) => acc,
    }
}

/// Fold one chunk of row values into a partial result.
fn fold_chunk(reduce: &Reduce, values: &[Value]) -> Value {
    match reduce {
        Reduce::Count => Value::Int(values.len() as i64),
        Reduce::Sum => values
            .iter()
            .fold(Value::Int(0), |acc, v| numeric_add(acc, v)),
        Reduce::Custom(combine) => {
            let mut iter = values.iter();
            let first = iter.next().cloned().unwrap_or(Value::Null);
            iter.fold(first, |acc, v| combine(acc, v.clone()))
        }
    }
}

/// Combine two partial results.
fn combine_partials(reduce: &Reduce, a: Value, b: Value) -> Value {
    match reduce {
        Reduce::Count | Reduce::Sum => numeric_add(a, &b),
        Reduce::Custom(combine) => combine(a, b),
    }
}

/// Reduce a key range to one `(group_key, reduced_value)` pair per group,
/// in ascending group order.
pub fn reduce_range(
    snapshot: &IndexSnapshot,
    start: Bound<&Value>,
    end: Bound<&Value>,
    group_level: usize,
    reduce: &Reduce,
    chunk_size: usize,
) -> Vec<(Value, Value)> {
    let chunk_size = chunk_size.max(1);
    let mut out: Vec<(Value, Value)> = Vec::new();

    let mut current: Option<Value> = None;
    let mut pending: Vec<Value> = Vec::new();
    let mut partial: Option<Value> = None;

    let mut flush_chunk = |pending: &mut Vec<Value>, partial: &mut Option<Value>| {
        if pending.is_empty() {
            return;
        }
        let folded = fold_chunk(reduce, pending);
        pending.clear();
        *partial = Some(match partial.take() {
            Some(prev) => combine_partials(reduce, prev, folded),
            None => folded,
        });
    };

    for entry in snapshot.scan(start, end, false) {
        let group = group_key(entry.key, group_level);
        let same = current
            .as_ref()
            .is_some_and(|g| vantage_core::collate(g, &group) == std::cmp::Ordering::Equal);
        if !same {
            if let Some(finished) = current.take() {
                flush_chunk(&mut pending, &mut partial);
                if let Some(value) = partial.take() {
                    out.push((finished, value));
                }
            }
            current = Some(group);
        }
        pending.push(entry.value.clone());
        if pending.len() >= chunk_size {
            flush_chunk(&mut pending, &mut partial);
        }
    }

    if let Some(finished) = current.take() {
        flush_chunk(&mut pending, &mut partial);
        if let Some(value) = partial.take() {
            out.push((finished, value));
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vantage_core::{DocId, Emission};
    use vantage_index::IndexStore;

    fn snap(rows: &[(&str, Value, Value)]) -> IndexSnapshot {
        let store = IndexStore::new("t");
        let mut by_doc: Vec<(DocId, Vec<Emission>)> = Vec::new();
        for (doc, key, value) in rows {
            let id = DocId::from(*doc);
            match by_doc.iter_mut().find(|(d, _)| *d == id) {
                Some((_, emissions)) => emissions.push(Emission::new(key.clone(), value.clone())),
                None => by_doc.push((id, vec![Emission::new(key.clone(), value.clone())])),
            }
        }
        for (id, emissions) in &by_doc {
            store.apply(id, emissions).unwrap();
        }
        store.snapshot().unwrap()
    }

    fn arr(parts: &[&str]) -> Value {
        Value::Array(parts.iter().map(|p| Value::from(*p)).collect())
    }

    #[test]
    fn test_count_level_zero_collapses_range() {
        let s = snap(&[
            ("d1", Value::from("a"), Value::Int(1)),
            ("d2", Value::from("b"), Value::Int(1)),
            ("d3", Value::from("b"), Value::Int(1)),
        ]);
        let out = reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 0, &Reduce::Count, 1024);
        assert_eq!(out, vec![(Value::Null, Value::Int(3))]);
    }

    #[test]
    fn test_count_groups_scalar_keys() {
        let s = snap(&[
            ("d1", Value::from("app1"), Value::Int(1)),
            ("d2", Value::from("app1"), Value::Int(1)),
            ("d3", Value::from("app1"), Value::Int(1)),
            ("d4", Value::from("app2"), Value::Int(1)),
        ]);
        let out = reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 1, &Reduce::Count, 1024);
        assert_eq!(
            out,
            vec![
                (Value::from("app1"), Value::Int(3)),
                (Value::from("app2"), Value::Int(1)),
            ]
        );
    }

    #[test]
    fn test_group_level_truncates_array_keys() {
        let s = snap(&[
            ("d1", arr(&["p1", "s1"]), Value::Int(1)),
            ("d2", arr(&["p1", "s2"]), Value::Int(1)),
            ("d3", arr(&["p2", "s1"]), Value::Int(1)),
        ]);
        let out = reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 1, &Reduce::Count, 1024);
        assert_eq!(
            out,
            vec![
                (arr(&["p1"]), Value::Int(2)),
                (arr(&["p2"]), Value::Int(1)),
            ]
        );

        // Full-depth grouping keeps each compound key distinct
        let out = reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 2, &Reduce::Count, 1024);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_sum_mixes_ints_and_floats() {
        let s = snap(&[
            ("d1", Value::from("k"), Value::Int(2)),
            ("d2", Value::from("k"), Value::Float(0.5)),
            ("d3", Value::from("k"), Value::Int(3)),
        ]);
        let out = reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 1, &Reduce::Sum, 1024);
        assert_eq!(out, vec![(Value::from("k"), Value::Float(5.5))]);
    }

    #[test]
    fn test_sum_ignores_non_numeric_values() {
        let s = snap(&[
            ("d1", Value::from("k"), Value::Int(4)),
            ("d2", Value::from("k"), Value::from("oops")),
        ]);
        let out = reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 1, &Reduce::Sum, 1024);
        assert_eq!(out, vec![(Value::from("k"), Value::Int(4))]);
    }

    #[test]
    fn test_chunking_matches_single_pass() {
        let s = snap(&[
            ("d1", Value::from("k"), Value::Int(1)),
            ("d2", Value::from("k"), Value::Int(2)),
            ("d3", Value::from("k"), Value::Int(3)),
            ("d4", Value::from("k"), Value::Int(4)),
            ("d5", Value::from("k"), Value::Int(5)),
        ]);
        let whole = reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 1, &Reduce::Sum, 1024);
        for chunk in [1, 2, 3] {
            let chunked =
                reduce_range(&s, Bound::Unbounded, Bound::Unbounded, 1, &Reduce::Sum, chunk);
            assert_eq!(chunked, whole);
        }
    }

    #[test]
    fn test_custom_combiner_max() {
        let combine: vantage_views::CombineFn = Arc::new(|a: Value, b: Value| {
            if vantage_core::collate(&a, &b) == std::cmp::Ordering::Less {
                b
            } else {
                a
            }
        });
        let s = snap(&[
            ("d1", Value::from("k"), Value::Int(7)),
            ("d2", Value::from("k"), Value::Int(12)),
            ("d3", Value::from("k"), Value::Int(3)),
        ]);
        let out = reduce_range(
            &s,
            Bound::Unbounded,
            Bound::Unbounded,
            1,
            &Reduce::Custom(combine),
            2,
        );
        assert_eq!(out, vec![(Value::from("k"), Value::Int(12))]);
    }

    #[test]
    fn test_bounded_range_reduces_subset() {
        let s = snap(&[
            ("d1", Value::from("a"), Value::Int(1)),
            ("d2", Value::from("b"), Value::Int(1)),
            ("d3", Value::from("c"), Value::Int(1)),
        ]);
        let b = Value::from("b");
        let out = reduce_range(&s, Bound::Included(&b), Bound::Unbounded, 0, &Reduce::Count, 1024);
        assert_eq!(out, vec![(Value::Null, Value::Int(2))]);
    }

    #[test]
    fn test_empty_range_yields_no_groups() {
        let s = snap(&[("d1", Value::from("a"), Value::Int(1))]);
        let z = Value::from("z");
        let out = reduce_range(&s, Bound::Included(&z), Bound::Unbounded, 0, &Reduce::Count, 1024);
        assert!(out.is_empty());
    }
}

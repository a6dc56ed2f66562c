//! Total cross-type ordering for view keys
//!
//! Documents of different shapes emit keys of different types into the same
//! index, so the index needs one deterministic total order over all of them.
//! The order extends the natural order of scalars:
//!
//! ```text
//! Null < Bool(false < true) < numbers < String < Array < Object
//! ```
//!
//! - Int and Float compare numerically; on a numeric tie Int sorts first so
//!   the order stays total and antisymmetric. NaN sorts after every other
//!   number (IEEE total order).
//! - Strings compare bytewise (ordinal). Consumers that probe prefixes with
//!   `[key, key + "ZZZZZZ"]`-style ranges only need consistency, not locale
//!   collation.
//! - Arrays (compound keys) compare lexicographically, component-wise.
//! - Objects compare by their entries sorted by field name.
//!
//! [`SortKey`] wraps a [`Value`] with `Ord` under this order, so ordered
//! containers can key on it directly.

use crate::value::Value;
use std::cmp::Ordering;

/// Rank of a value's type in the cross-type order.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compare two values under the total cross-type key order.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        // Mixed numerics: compare numerically, Int first on a tie
        (Value::Int(x), Value::Float(y)) => match (*x as f64).total_cmp(y) {
            Ordering::Equal => Ordering::Less,
            ord => ord,
        },
        (Value::Float(x), Value::Int(y)) => match x.total_cmp(&(*y as f64)) {
            Ordering::Equal => Ordering::Greater,
            ord => ord,
        },
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Array(x), Value::Array(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let ord = collate(xi, yi);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|(ka, _), (kb, _)| ka.cmp(kb));
            ys.sort_by(|(ka, _), (kb, _)| ka.cmp(kb));
            for ((ka, va), (kb, vb)) in xs.iter().zip(ys.iter()) {
                let ord = ka.cmp(kb);
                if ord != Ordering::Equal {
                    return ord;
                }
                let ord = collate(va, vb);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        // Unreachable: type_rank already separated distinct types
        _ => Ordering::Equal,
    }
}

/// A view key wrapped with the total cross-type order.
///
/// Equality and ordering follow [`collate`], not `Value`'s own `PartialEq`
/// (in particular NaN keys are equal to themselves here, keeping the order
/// total for the ordered containers that hold index entries).
#[derive(Debug, Clone)]
pub struct SortKey(pub Value);

impl SortKey {
    /// Borrow the wrapped value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the inner value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for SortKey {
    fn from(v: Value) -> Self {
        SortKey(v)
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        collate(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        collate(&self.0, &other.0)
    }
}

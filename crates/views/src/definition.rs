//! View definitions: entity filter, extraction rule, optional reduce
//!
//! A [`ViewDefinition`] is the unit of registration: a unique name, an
//! entity filter, a pure extraction rule, and an optional associative
//! reduce. The rule is a capability behind `Arc<dyn Fn>` — its body is
//! configuration, not engine code.
//!
//! ## Purity contract
//!
//! `MapFn` must be a pure, total function of the document: the engine diffs
//! old vs. new emission sets by value, which is only sound if re-running the
//! rule on the same document yields the same emissions. Side effects beyond
//! the emission sequence are not observable to the engine and must not be
//! relied upon.

use crate::executor::Emitter;
use std::fmt;
use std::sync::Arc;
use vantage_core::{Document, Value};

/// Extraction rule: inspects a document and emits zero or more
/// (key, value) pairs through the [`Emitter`].
pub type MapFn = Arc<dyn Fn(&Document, &mut Emitter) + Send + Sync>;

/// Associative combine over aggregate values:
/// `combine(combine(a, b), c) == combine(a, combine(b, c))`.
///
/// The engine is free to combine partial aggregates over disjoint
/// sub-ranges in any grouping, so associativity is required (commutativity
/// is not, but is recommended).
pub type CombineFn = Arc<dyn Fn(Value, Value) -> Value + Send + Sync>;

/// Predicate over a document's entity discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFilter {
    /// Match documents of exactly one entity type.
    Entity(String),
    /// Match every document. The rule itself decides what to emit;
    /// cross-entity views typically guard on fields internally.
    All,
}

impl EntityFilter {
    /// Whether a document with the given entity passes this filter.
    pub fn matches(&self, entity: Option<&str>) -> bool {
        match self {
            EntityFilter::Entity(want) => entity == Some(want.as_str()),
            EntityFilter::All => true,
        }
    }
}

/// Reduce-style aggregate attached to a view.
#[derive(Clone)]
pub enum Reduce {
    /// Count indexed rows (the degenerate `combine = (+)` over constant 1).
    Count,
    /// Sum numeric emission values (Int stays Int until a Float appears).
    Sum,
    /// User-supplied associative combine over emission values.
    Custom(CombineFn),
}

impl fmt::Debug for Reduce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduce::Count => f.write_str("Count"),
            Reduce::Sum => f.write_str("Sum"),
            Reduce::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named extraction rule (plus optional reduce) defining one secondary
/// index. Each registered name is an independent index, even when two views
/// share a key shape.
#[derive(Clone)]
pub struct ViewDefinition {
    name: String,
    filter: EntityFilter,
    map: MapFn,
    reduce: Option<Reduce>,
}

impl ViewDefinition {
    /// Start building a view with the given unique name.
    pub fn builder(name: impl Into<String>) -> ViewBuilder {
        ViewBuilder {
            name: name.into(),
            filter: EntityFilter::All,
            map: None,
            reduce: None,
        }
    }

    /// The view's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The view's entity filter.
    pub fn filter(&self) -> &EntityFilter {
        &self.filter
    }

    /// The extraction rule.
    pub fn map(&self) -> &MapFn {
        &self.map
    }

    /// The optional reduce.
    pub fn reduce(&self) -> Option<&Reduce> {
        self.reduce.as_ref()
    }
}

impl fmt::Debug for ViewDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewDefinition")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("reduce", &self.reduce)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ViewDefinition`].
pub struct ViewBuilder {
    name: String,
    filter: EntityFilter,
    map: Option<MapFn>,
    reduce: Option<Reduce>,
}

impl ViewBuilder {
    /// Restrict the view to one entity type.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.filter = EntityFilter::Entity(entity.into());
        self
    }

    /// Match every document (the default).
    pub fn all_entities(mut self) -> Self {
        self.filter = EntityFilter::All;
        self
    }

    /// Set the extraction rule.
    pub fn map<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document, &mut Emitter) + Send + Sync + 'static,
    {
        self.map = Some(Arc::new(f));
        self
    }

    /// Attach a reduce.
    pub fn reduce(mut self, reduce: Reduce) -> Self {
        self.reduce = Some(reduce);
        self
    }

    /// Finish the definition. A view without a map function emits nothing.
    pub fn build(self) -> ViewDefinition {
        ViewDefinition {
            name: self.name,
            filter: self.filter,
            map: self.map.unwrap_or_else(|| Arc::new(|_, _| {})),
            reduce: self.reduce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_filter() {
        let f = EntityFilter::Entity("sample".to_string());
        assert!(f.matches(Some("sample")));
        assert!(!f.matches(Some("project")));
        assert!(!f.matches(None));

        assert!(EntityFilter::All.matches(Some("anything")));
        assert!(EntityFilter::All.matches(None));
    }

    #[test]
    fn test_builder_defaults() {
        let view = ViewDefinition::builder("sample/name").build();
        assert_eq!(view.name(), "sample/name");
        assert_eq!(view.filter(), &EntityFilter::All);
        assert!(view.reduce().is_none());
    }

    #[test]
    fn test_builder_full() {
        let view = ViewDefinition::builder("project/application")
            .entity("project")
            .map(|doc, out| {
                if let Some(app) = doc.field("application") {
                    out.emit(app.clone(), 1);
                }
            })
            .reduce(Reduce::Count)
            .build();
        assert_eq!(
            view.filter(),
            &EntityFilter::Entity("project".to_string())
        );
        assert!(matches!(view.reduce(), Some(Reduce::Count)));
    }

    #[test]
    fn test_debug_does_not_require_fn_debug() {
        let view = ViewDefinition::builder("v")
            .map(|_, _| {})
            .reduce(Reduce::Custom(Arc::new(|a, _| a)))
            .build();
        let s = format!("{:?}", view);
        assert!(s.contains("Custom"));
    }
}

//! View registry: named view definitions with entity fan-out
//!
//! Views register once under a unique name. A `Custom` combine function is
//! probed a single time at registration (a panicking combine is a
//! programming error in the view definition); it is never re-validated per
//! query. Built-in Count/Sum reduces are total by construction.

use crate::definition::{Reduce, ViewDefinition};
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;
use vantage_core::{RegistrationError, Value};

/// Name-keyed registry of view definitions.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: DashMap<String, Arc<ViewDefinition>>,
}

impl ViewRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view. Fails on duplicate names and on combine functions
    /// that do not survive the one-time validation probe.
    pub fn register(&self, view: ViewDefinition) -> Result<Arc<ViewDefinition>, RegistrationError> {
        if let Some(Reduce::Custom(combine)) = view.reduce() {
            let combine = Arc::clone(combine);
            let probe = catch_unwind(AssertUnwindSafe(|| {
                combine(Value::Int(0), Value::Int(0))
            }));
            if let Err(payload) = probe {
                return Err(RegistrationError::CombineFailed {
                    view: view.name().to_string(),
                    cause: payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string()),
                });
            }
        }

        let name = view.name().to_string();
        let view = Arc::new(view);
        // Insert-once: entry API keeps check-and-insert atomic
        match self.views.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RegistrationError::DuplicateName(name))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&view));
                debug!(view = name.as_str(), "view registered");
                Ok(view)
            }
        }
    }

    /// Look up a view by name.
    pub fn get(&self, name: &str) -> Option<Arc<ViewDefinition>> {
        self.views.get(name).map(|v| Arc::clone(v.value()))
    }

    /// All views whose filter matches the given entity.
    pub fn matching(&self, entity: Option<&str>) -> Vec<Arc<ViewDefinition>> {
        self.views
            .iter()
            .filter(|e| e.value().filter().matches(entity))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Registered view names.
    pub fn names(&self) -> Vec<String> {
        self.views.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether no views are registered.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

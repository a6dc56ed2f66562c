//! The view engine: registration, change fan-out, and query dispatch
//!
//! [`ViewEngine`] owns one [`IndexStore`] plus maintenance worker per
//! registered view. A document change is extracted against every view
//! inline (extraction is stateless and cheap to run on the caller's
//! thread) and the resulting patches are queued to the per-view workers.
//! Every worker observes every change, including ones where the view's
//! entity filter rejects the document, so the per-view revision watermark
//! advances uniformly and `wait_for` never hangs on a non-matching view.
//!
//! Entity immutability is enforced here, at the boundary: a change that
//! re-labels a known document id with a different entity is rejected
//! before any index is touched.

use crate::config::EngineConfig;
use crate::maintenance::{IndexHandle, PatchOp, ViewStatsSnapshot};
use crate::query::{self, Page, RangeSpec};
use crate::reduce::reduce_range;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vantage_core::{
    DocChange, DocId, Document, Emission, Error, IndexError, QueryError, Value,
};
use vantage_index::{IndexSnapshot, IndexStats, IndexStore};
use vantage_views::{execute, ViewDefinition, ViewRegistry};

/// Incremental view maintenance over a stream of document changes.
pub struct ViewEngine {
    registry: ViewRegistry,
    config: EngineConfig,
    handles: DashMap<String, Arc<IndexHandle>>,
    // Entity recorded per live document id, for immutability enforcement.
    entities: DashMap<DocId, Option<String>>,
}

impl ViewEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        ViewEngine {
            registry: ViewRegistry::new(),
            config,
            handles: DashMap::new(),
            entities: DashMap::new(),
        }
    }

    /// Create an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Register a view and spawn its index maintenance worker.
    ///
    /// The new index starts empty; changes notified after registration are
    /// reflected, earlier documents are not until a [`rebuild`].
    ///
    /// [`rebuild`]: ViewEngine::rebuild
    pub fn register(&self, view: ViewDefinition) -> Result<(), Error> {
        let view = self.registry.register(view)?;
        let store = Arc::new(IndexStore::new(view.name()));
        let handle = IndexHandle::spawn(store, self.config.retry.clone());
        self.handles.insert(view.name().to_string(), Arc::new(handle));
        info!(view = view.name(), "view registered");
        Ok(())
    }

    /// Apply one committed document change to every registered view.
    ///
    /// Extraction runs inline; index patching is asynchronous. A view rule
    /// that fails on this document has its failure counted and the
    /// document's contribution to that view removed.
    pub fn notify(&self, change: DocChange) -> Result<(), Error> {
        self.check_entity(&change)?;

        if change.is_delete() {
            self.entities.remove(&change.doc_id);
        } else {
            self.entities
                .insert(change.doc_id.clone(), change.entity.clone());
        }

        let doc = change.new_document();
        for entry in self.handles.iter() {
            let handle = entry.value();
            let emissions = self.extract_for(entry.key(), doc.as_ref(), handle);
            handle.enqueue(PatchOp {
                doc_id: change.doc_id.clone(),
                revision: change.revision,
                emissions,
            })?;
        }
        Ok(())
    }

    /// Emissions this view gets for the written document (empty on delete,
    /// filter mismatch, or rule failure).
    fn extract_for(
        &self,
        view_name: &str,
        doc: Option<&Document>,
        handle: &IndexHandle,
    ) -> Vec<Emission> {
        let Some(doc) = doc else {
            return Vec::new();
        };
        let Some(view) = self.registry.get(view_name) else {
            return Vec::new();
        };
        match execute(&view, doc, &self.config.limits) {
            Ok(emissions) => emissions,
            Err(err) => {
                warn!(view = view_name, doc = %doc.id, error = %err, "extraction failed");
                handle.stats.record_extraction_failure();
                Vec::new()
            }
        }
    }

    fn check_entity(&self, change: &DocChange) -> Result<(), IndexError> {
        if let Some(recorded) = self.entities.get(&change.doc_id) {
            if *recorded.value() != change.entity {
                return Err(IndexError::EntityChanged {
                    doc: change.doc_id.to_string(),
                    was: recorded.value().clone(),
                    now: change.entity.clone(),
                });
            }
        }
        Ok(())
    }

    /// Block until the named view has processed `revision` for `doc_id`,
    /// or the timeout elapses. Returns whether the barrier was reached.
    pub fn wait_for(
        &self,
        view: &str,
        doc_id: &DocId,
        revision: u64,
        timeout: Duration,
    ) -> Result<bool, QueryError> {
        let handle = self.handle(view)?;
        Ok(handle.watermark.wait_for(doc_id, revision, timeout))
    }

    /// A point-in-time snapshot of the view's index.
    pub fn snapshot(&self, view: &str) -> Result<IndexSnapshot, QueryError> {
        let handle = self.handle(view)?;
        handle.store.snapshot().map_err(|_| QueryError::Unusable {
            view: view.to_string(),
        })
    }

    /// Equality lookup: all `(doc_id, value)` rows indexed under `key`, in
    /// document order.
    pub fn get(&self, view: &str, key: &Value) -> Result<Vec<(DocId, Value)>, QueryError> {
        Ok(self.snapshot(view)?.lookup(key))
    }

    /// Range query with pagination over the view's index.
    pub fn query(&self, view: &str, spec: &RangeSpec) -> Result<Page, QueryError> {
        let snapshot = self.snapshot(view)?;
        query::execute(&snapshot, spec)
    }

    /// Reduce the rows of a key range, grouped at `group_level`.
    ///
    /// Fails with [`QueryError::NoReduce`] when the view was registered
    /// without a reduce function.
    pub fn reduce(
        &self,
        view: &str,
        spec: &RangeSpec,
        group_level: usize,
    ) -> Result<Vec<(Value, Value)>, QueryError> {
        let definition = self
            .registry
            .get(view)
            .ok_or_else(|| QueryError::UnknownView(view.to_string()))?;
        let Some(reduce) = definition.reduce() else {
            return Err(QueryError::NoReduce(view.to_string()));
        };
        spec.validate()?;
        let snapshot = self.snapshot(view)?;
        Ok(reduce_range(
            &snapshot,
            spec.start_bound(),
            spec.end_bound(),
            group_level,
            reduce,
            self.config.reduce_chunk,
        ))
    }

    /// Number of rows in a key range, computed by the aggregation path
    /// regardless of whether the view has a reduce function.
    pub fn count(&self, view: &str, spec: &RangeSpec) -> Result<u64, QueryError> {
        spec.validate()?;
        let snapshot = self.snapshot(view)?;
        let groups = reduce_range(
            &snapshot,
            spec.start_bound(),
            spec.end_bound(),
            0,
            &vantage_views::Reduce::Count,
            self.config.reduce_chunk,
        );
        Ok(match groups.first() {
            Some((_, Value::Int(n))) => *n as u64,
            _ => 0,
        })
    }

    /// Check the view's index bookkeeping; poisons the index on failure.
    pub fn verify(&self, view: &str) -> Result<(), Error> {
        let handle = self.handle(view).map_err(Error::from)?;
        handle.store.verify()?;
        Ok(())
    }

    /// Rebuild the view's index from scratch over a full document scan.
    ///
    /// Clears the index (and its poisoned flag), then re-extracts every
    /// document inline on the caller's thread. Callers must quiesce change
    /// notifications for this view for the duration.
    pub fn rebuild(
        &self,
        view: &str,
        docs: impl IntoIterator<Item = Document>,
    ) -> Result<(), Error> {
        let handle = self.handle(view).map_err(Error::from)?;
        let definition = self
            .registry
            .get(view)
            .ok_or_else(|| QueryError::UnknownView(view.to_string()))?;

        handle.store.clear();
        let mut rebuilt = 0usize;
        for doc in docs {
            let emissions = match execute(&definition, &doc, &self.config.limits) {
                Ok(emissions) => emissions,
                Err(err) => {
                    warn!(view, doc = %doc.id, error = %err, "extraction failed during rebuild");
                    handle.stats.record_extraction_failure();
                    Vec::new()
                }
            };
            handle.store.apply(&doc.id, &emissions)?;
            handle.watermark.advance(&doc.id, doc.revision);
            rebuilt += 1;
        }
        info!(view, documents = rebuilt, "index rebuilt");
        Ok(())
    }

    /// Per-view maintenance counters.
    pub fn stats(&self, view: &str) -> Result<ViewStatsSnapshot, QueryError> {
        Ok(self.handle(view)?.stats.snapshot())
    }

    /// Size and patch counters for the view's index.
    pub fn index_stats(&self, view: &str) -> Result<IndexStats, QueryError> {
        Ok(self.handle(view)?.store.stats())
    }

    /// Names of all registered views.
    pub fn views(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Stop all maintenance workers, draining their queues first.
    pub fn shutdown(&self) {
        for entry in self.handles.iter() {
            entry.value().shutdown();
        }
    }

    fn handle(&self, view: &str) -> Result<Arc<IndexHandle>, QueryError> {
        self.handles
            .get(view)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| QueryError::UnknownView(view.to_string()))
    }
}

impl std::fmt::Debug for ViewEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewEngine")
            .field("views", &self.registry.len())
            .field("documents", &self.entities.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! # Vantage
//!
//! Incremental secondary-index ("view") engine for heterogeneous document
//! stores. A view pairs an entity filter with an extraction rule that maps
//! one document to zero or more `(key, value)` emissions; the engine keeps
//! one sorted index per view and patches it incrementally as documents are
//! created, updated, and deleted. Queries read point-in-time snapshots:
//! equality lookups, collation-ordered range scans with pagination, and
//! group-level reduce aggregation.
//!
//! ## Quick start
//!
//! ```
//! use vantagedb::{Document, Value, Vantage, ViewDefinition};
//!
//! let db = Vantage::with_defaults();
//! db.register(
//!     ViewDefinition::builder("sample/tag")
//!         .entity("sample")
//!         .map(|doc, out| {
//!             let (Some(Value::Array(tags)), Some(name)) =
//!                 (doc.field("tags"), doc.field("name"))
//!             else {
//!                 return;
//!             };
//!             for tag in tags {
//!                 out.emit(tag.clone(), name.clone());
//!             }
//!         })
//!         .build(),
//! )
//! .unwrap();
//!
//! let doc = Document::new("s-1", "sample")
//!     .with_field("name", "S-100")
//!     .with_field("tags", vec![Value::from("qc"), Value::from("batch1")]);
//! db.insert(&doc).unwrap();
//! let timeout = std::time::Duration::from_secs(5);
//! assert!(db.wait_for("sample/tag", &doc.id, doc.revision, timeout).unwrap());
//!
//! let rows = db.get("sample/tag", &Value::from("qc")).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```
//!
//! The crates underneath are usable on their own: `vantage-core` (values,
//! collation, documents, errors), `vantage-views` (definitions, extraction),
//! `vantage-index` (sorted index store and snapshots), `vantage-engine`
//! (maintenance workers, queries, reduce).

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::time::Duration;

pub use vantage_core::{
    collate, DocChange, DocId, Document, Emission, Error, ExtractionError, Fields, IndexError,
    Limits, QueryError, RegistrationError, Result, Value,
};
pub use vantage_engine::{
    Cursor, EngineConfig, Page, RangeSpec, RetryConfig, Row, ViewStatsSnapshot,
};
pub use vantage_index::{IndexSnapshot, IndexStats};
pub use vantage_views::{EntityFilter, Reduce, ViewDefinition};

use vantage_engine::ViewEngine;

/// The view engine behind a document-lifecycle API.
///
/// `Vantage` does not store documents; it consumes change notifications
/// from whatever store owns them. The `insert` / `update` / `remove`
/// conveniences build the corresponding [`DocChange`] for callers that
/// have the document at hand.
#[derive(Debug)]
pub struct Vantage {
    engine: ViewEngine,
}

impl Vantage {
    /// Create an instance with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Vantage {
            engine: ViewEngine::new(config),
        }
    }

    /// Create an instance with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Register a view. Fails on a duplicate name or a combine function
    /// that errors on probe.
    pub fn register(&self, view: ViewDefinition) -> Result<()> {
        self.engine.register(view)
    }

    /// Apply one committed document change to all views.
    pub fn notify(&self, change: DocChange) -> Result<()> {
        self.engine.notify(change)
    }

    /// Notify the creation of `doc`.
    pub fn insert(&self, doc: &Document) -> Result<()> {
        self.notify(DocChange::created(doc))
    }

    /// Notify an update of `doc`, whose fields before the write were
    /// `previous`.
    pub fn update(&self, doc: &Document, previous: Fields) -> Result<()> {
        self.notify(DocChange::updated(doc, previous))
    }

    /// Notify the deletion of a document.
    pub fn remove(
        &self,
        doc_id: impl Into<DocId>,
        entity: Option<String>,
        revision: u64,
        previous: Fields,
    ) -> Result<()> {
        self.notify(DocChange::deleted(doc_id, entity, revision, previous))
    }

    /// Block until `view` has processed `revision` for `doc_id`, or the
    /// timeout elapses. Returns whether the barrier was reached.
    pub fn wait_for(
        &self,
        view: &str,
        doc_id: &DocId,
        revision: u64,
        timeout: Duration,
    ) -> Result<bool> {
        self.engine
            .wait_for(view, doc_id, revision, timeout)
            .map_err(Error::from)
    }

    /// Equality lookup: all `(doc_id, value)` rows under `key`.
    pub fn get(&self, view: &str, key: &Value) -> Result<Vec<(DocId, Value)>> {
        self.engine.get(view, key).map_err(Error::from)
    }

    /// Range query with pagination.
    pub fn query(&self, view: &str, spec: &RangeSpec) -> Result<Page> {
        self.engine.query(view, spec).map_err(Error::from)
    }

    /// Point-in-time snapshot of the view's index.
    pub fn snapshot(&self, view: &str) -> Result<IndexSnapshot> {
        self.engine.snapshot(view).map_err(Error::from)
    }

    /// Group-level reduce over a key range.
    pub fn reduce(
        &self,
        view: &str,
        spec: &RangeSpec,
        group_level: usize,
    ) -> Result<Vec<(Value, Value)>> {
        self.engine
            .reduce(view, spec, group_level)
            .map_err(Error::from)
    }

    /// Number of rows in a key range.
    pub fn count(&self, view: &str, spec: &RangeSpec) -> Result<u64> {
        self.engine.count(view, spec).map_err(Error::from)
    }

    /// Check the view's index bookkeeping; poisons the index on failure.
    pub fn verify(&self, view: &str) -> Result<()> {
        self.engine.verify(view)
    }

    /// Rebuild the view's index from a full document scan. Callers must
    /// quiesce change notifications for this view for the duration.
    pub fn rebuild(&self, view: &str, docs: impl IntoIterator<Item = Document>) -> Result<()> {
        self.engine.rebuild(view, docs)
    }

    /// Per-view maintenance counters.
    pub fn stats(&self, view: &str) -> Result<ViewStatsSnapshot> {
        self.engine.stats(view).map_err(Error::from)
    }

    /// Size and patch counters for the view's index.
    pub fn index_stats(&self, view: &str) -> Result<IndexStats> {
        self.engine.index_stats(view).map_err(Error::from)
    }

    /// Names of all registered views.
    pub fn views(&self) -> Vec<String> {
        self.engine.views()
    }

    /// Stop all maintenance workers, draining their queues first. Also
    /// runs on drop.
    pub fn shutdown(&self) {
        self.engine.shutdown()
    }
}

impl Default for Vantage {
    fn default() -> Self {
        Self::with_defaults()
    }
}

//! Error types for the view engine
//!
//! The taxonomy mirrors the recovery story of each layer:
//! - `ExtractionError` is recovered locally: the document is treated as
//!   emitting nothing for that view and the failure is counted/logged.
//! - `IndexError::CorruptionDetected` is fatal for one index; the defined
//!   recovery is a full rebuild. Other indexes are unaffected.
//! - `QueryError` is reported synchronously to the caller, no state change.
//!
//! We use `thiserror` for automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure while running a view's extraction rule against one document.
///
/// Always recovered locally; a faulty rule must never corrupt the index or
/// crash the maintenance pipeline for other documents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// The rule raised an internal fault (panic).
    #[error("view '{view}': extraction rule failed: {cause}")]
    RuleFailure {
        /// View whose rule failed.
        view: String,
        /// Captured panic payload.
        cause: String,
    },

    /// The rule exceeded the per-document emission cap.
    #[error("view '{view}': emission limit of {limit} exceeded")]
    EmissionLimitExceeded {
        /// View whose rule overflowed.
        view: String,
        /// The configured cap.
        limit: usize,
    },
}

/// Failure in the index store or the maintenance pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The core consistency invariant failed: the flattened per-document
    /// bookkeeping no longer equals the entry arena. Fatal for this index.
    #[error("view '{view}': index corruption detected: {detail}")]
    CorruptionDetected {
        /// The corrupted view.
        view: String,
        /// What the invariant check found.
        detail: String,
    },

    /// The index was marked unusable by a prior corruption; rebuild required.
    #[error("view '{view}': index is unusable, rebuild required")]
    Unusable {
        /// The poisoned view.
        view: String,
    },

    /// No view registered under this name.
    #[error("unknown view: '{0}'")]
    UnknownView(String),

    /// A change notification violated entity immutability for a document id.
    #[error("document '{doc}': entity changed from {was:?} to {now:?}")]
    EntityChanged {
        /// The offending document id.
        doc: String,
        /// Entity recorded for this id.
        was: Option<String>,
        /// Entity carried by the rejected change.
        now: Option<String>,
    },

    /// The maintenance worker for this index has shut down.
    #[error("view '{view}': maintenance worker has shut down")]
    WorkerShutdown {
        /// The affected view.
        view: String,
    },
}

/// Failure reported synchronously by the query boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Start key sorts after end key once inclusivity is normalized.
    #[error("invalid range: start key sorts after end key")]
    InvalidRange,

    /// No view registered under this name.
    #[error("unknown view: '{0}'")]
    UnknownView(String),

    /// The index is poisoned; rebuild required before queries succeed.
    #[error("view '{view}': index is unusable, rebuild required")]
    Unusable {
        /// The poisoned view.
        view: String,
    },

    /// Reduce was requested on a view registered without a reduce function.
    #[error("view '{0}' has no reduce function")]
    NoReduce(String),
}

/// Failure while registering a view definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A view with this name is already registered.
    #[error("a view named '{0}' is already registered")]
    DuplicateName(String),

    /// The supplied combine function failed its one-time validation probe.
    /// A failing combine is a programming error in the view definition.
    #[error("view '{view}': combine function failed validation: {cause}")]
    CombineFailed {
        /// The rejected view.
        view: String,
        /// Captured panic payload from the probe.
        cause: String,
    },
}

/// Umbrella error for the engine facade.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Extraction rule failure.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Index store / maintenance failure.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Query boundary failure.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// View registration failure.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_display() {
        let err = ExtractionError::RuleFailure {
            view: "sample/tag".to_string(),
            cause: "index out of bounds".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sample/tag"));
        assert!(msg.contains("index out of bounds"));

        let err = ExtractionError::EmissionLimitExceeded {
            view: "sample/tag".to_string(),
            limit: 10_000,
        };
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_index_error_display() {
        let err = IndexError::CorruptionDetected {
            view: "account/name".to_string(),
            detail: "orphaned entry".to_string(),
        };
        assert!(err.to_string().contains("corruption"));

        let err = IndexError::EntityChanged {
            doc: "d1".to_string(),
            was: Some("sample".to_string()),
            now: Some("project".to_string()),
        };
        assert!(err.to_string().contains("d1"));
    }

    #[test]
    fn test_query_error_display() {
        assert!(QueryError::InvalidRange.to_string().contains("invalid range"));
        assert!(QueryError::NoReduce("x".to_string())
            .to_string()
            .contains("no reduce"));
    }

    #[test]
    fn test_umbrella_conversions() {
        let err: Error = ExtractionError::EmissionLimitExceeded {
            view: "v".to_string(),
            limit: 1,
        }
        .into();
        assert!(matches!(err, Error::Extraction(_)));

        let err: Error = QueryError::InvalidRange.into();
        assert!(matches!(err, Error::Query(_)));

        let err: Error = RegistrationError::DuplicateName("v".to_string()).into();
        assert!(matches!(err, Error::Registration(_)));
    }
}

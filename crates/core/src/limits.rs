//! Resource bounds enforced by the extraction executor
//!
//! The per-document emission cap bounds pathological documents (or faulty
//! rules) so one document cannot grow an index without bound. Violations
//! surface as `ExtractionError::EmissionLimitExceeded` and the document is
//! treated as emitting nothing for that view.

/// Resource limits for extraction.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum emissions one rule may produce for one document
    /// (default: 10,000).
    pub max_emissions_per_doc: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_emissions_per_doc: 10_000,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    ///
    /// Useful for unit tests that exercise limit enforcement without
    /// constructing very large documents.
    pub fn with_small_limits() -> Self {
        Limits {
            max_emissions_per_doc: 8,
        }
    }
}

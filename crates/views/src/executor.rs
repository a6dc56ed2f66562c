//! Extraction executor: run one rule against one document
//!
//! The executor is stateless and embarrassingly parallel across documents.
//! It filters first (a non-matching entity yields an empty emission set,
//! not an error), runs the rule under `catch_unwind`, and enforces the
//! per-document emission cap. A faulty rule never corrupts an index or
//! crashes the maintenance pipeline for other documents: its failure is
//! surfaced to the caller, which treats the document as emitting nothing
//! for that view.

use crate::definition::ViewDefinition;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;
use vantage_core::{Document, Emission, ExtractionError, Limits, Value};

/// Collects a rule's emissions, enforcing the emission cap.
pub struct Emitter {
    emissions: Vec<Emission>,
    limit: usize,
    overflowed: bool,
}

impl Emitter {
    fn new(limit: usize) -> Self {
        Emitter {
            emissions: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    /// Emit one (key, value) pair. May be called any number of times per
    /// document, including zero. Emissions past the cap are discarded and
    /// the run is reported as overflowed.
    pub fn emit(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        if self.emissions.len() >= self.limit {
            self.overflowed = true;
            return;
        }
        self.emissions.push(Emission::new(key, value));
    }

    /// Emit a key with no value (indexed as Null).
    pub fn emit_key(&mut self, key: impl Into<Value>) {
        self.emit(key, Value::Null);
    }

    /// Number of emissions collected so far.
    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    /// Whether nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }
}

/// Run a view's extraction rule against one document.
///
/// Returns the ordered emission sequence, or an [`ExtractionError`] if the
/// rule panicked or exceeded the emission cap. A document rejected by the
/// entity filter produces `Ok(vec![])` — "no emission" is the normal
/// outcome for non-matching documents.
pub fn execute(
    view: &ViewDefinition,
    doc: &Document,
    limits: &Limits,
) -> Result<Vec<Emission>, ExtractionError> {
    if !view.filter().matches(doc.entity.as_deref()) {
        return Ok(Vec::new());
    }

    let mut emitter = Emitter::new(limits.max_emissions_per_doc);
    let outcome = catch_unwind(AssertUnwindSafe(|| (view.map())(doc, &mut emitter)));

    match outcome {
        Err(payload) => Err(ExtractionError::RuleFailure {
            view: view.name().to_string(),
            cause: panic_message(payload),
        }),
        Ok(()) if emitter.overflowed => Err(ExtractionError::EmissionLimitExceeded {
            view: view.name().to_string(),
            limit: limits.max_emissions_per_doc,
        }),
        Ok(()) => {
            debug!(
                view = view.name(),
                doc = %doc.id,
                emissions = emitter.len(),
                "extraction complete"
            );
            Ok(emitter.emissions)
        }
    }
}

/// Best-effort extraction of a human-readable panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

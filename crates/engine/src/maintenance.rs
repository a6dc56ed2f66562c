//! Per-index maintenance worker
//!
//! Each index has exactly one maintenance worker consuming a FIFO patch
//! queue — the single-writer-per-index discipline: concurrent writes to
//! different documents affecting the same index serialize through the
//! queue, while independent indexes proceed fully in parallel.
//!
//! The worker applies patches with retry/backoff per [`RetryConfig`] and
//! advances a per-document revision watermark after every processed patch,
//! whether applied or dropped, so barrier waiters never hang. Corruption
//! poisons the store and further patches for it are dropped (counted) until
//! a rebuild; other indexes are unaffected.

use crate::config::RetryConfig;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use vantage_core::{DocId, Emission, IndexError};
use vantage_index::IndexStore;

/// One queued index patch: replace the document's contribution with the
/// given emissions (empty = delete).
#[derive(Debug)]
pub(crate) struct PatchOp {
    pub doc_id: DocId,
    pub revision: u64,
    pub emissions: Vec<Emission>,
}

/// Per-view counters.
#[derive(Debug, Default)]
pub struct ViewStats {
    patches_applied: AtomicU64,
    patches_dropped: AtomicU64,
    extraction_failures: AtomicU64,
    emissions_indexed: AtomicU64,
}

/// Point-in-time copy of [`ViewStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewStatsSnapshot {
    /// Patches applied to the index.
    pub patches_applied: u64,
    /// Patches dropped (poisoned index, or retries exhausted).
    pub patches_dropped: u64,
    /// Extraction runs that failed and were treated as emitting nothing.
    pub extraction_failures: u64,
    /// Emissions successfully handed to the index.
    pub emissions_indexed: u64,
}

impl ViewStats {
    pub(crate) fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out the counters.
    pub fn snapshot(&self) -> ViewStatsSnapshot {
        ViewStatsSnapshot {
            patches_applied: self.patches_applied.load(Ordering::Relaxed),
            patches_dropped: self.patches_dropped.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            emissions_indexed: self.emissions_indexed.load(Ordering::Relaxed),
        }
    }
}

/// Per-document revision watermark: the minimum-revision barrier for
/// monotonic reads.
#[derive(Debug, Default)]
pub(crate) struct Watermark {
    state: Mutex<FxHashMap<DocId, u64>>,
    cond: Condvar,
}

impl Watermark {
    pub(crate) fn advance(&self, doc_id: &DocId, revision: u64) {
        let mut state = self.state.lock();
        let slot = state.entry(doc_id.clone()).or_insert(0);
        if revision > *slot {
            *slot = revision;
        }
        drop(state);
        self.cond.notify_all();
    }

    /// Block until this index has processed `revision` for `doc_id`, or
    /// the timeout elapses. Returns whether the barrier was reached.
    pub(crate) fn wait_for(&self, doc_id: &DocId, revision: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.get(doc_id).copied().unwrap_or(0) >= revision {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.cond.wait_for(&mut state, deadline - now);
        }
    }
}

/// One index plus its maintenance worker and watermark.
pub(crate) struct IndexHandle {
    pub store: Arc<IndexStore>,
    pub stats: Arc<ViewStats>,
    pub watermark: Arc<Watermark>,
    sender: Mutex<Option<Sender<PatchOp>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IndexHandle {
    /// Create the handle and spawn its worker thread.
    pub fn spawn(store: Arc<IndexStore>, retry: RetryConfig) -> Self {
        let stats = Arc::new(ViewStats::default());
        let watermark = Arc::new(Watermark::default());
        let (tx, rx) = channel::<PatchOp>();

        let thread_store = Arc::clone(&store);
        let thread_stats = Arc::clone(&stats);
        let thread_watermark = Arc::clone(&watermark);
        let name = format!("vantage-idx-{}", store.name());
        let worker = std::thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(thread_store, thread_stats, thread_watermark, retry, rx))
            .expect("failed to spawn index maintenance worker");

        IndexHandle {
            store,
            stats,
            watermark,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a patch for the worker.
    pub fn enqueue(&self, op: PatchOp) -> Result<(), IndexError> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(op).map_err(|_| IndexError::WorkerShutdown {
                view: self.store.name().to_string(),
            }),
            None => Err(IndexError::WorkerShutdown {
                view: self.store.name().to_string(),
            }),
        }
    }

    /// Close the queue and join the worker, draining queued patches first.
    pub fn shutdown(&self) {
        // Dropping the sender ends the worker's recv loop after the queue drains
        self.sender.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!(view = self.store.name(), "maintenance worker panicked");
            }
        }
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    store: Arc<IndexStore>,
    stats: Arc<ViewStats>,
    watermark: Arc<Watermark>,
    retry: RetryConfig,
    rx: Receiver<PatchOp>,
) {
    debug!(view = store.name(), "maintenance worker started");
    while let Ok(op) = rx.recv() {
        apply_with_retry(&store, &stats, &retry, &op);
        // Advance even for dropped patches so barrier waiters never hang
        watermark.advance(&op.doc_id, op.revision);
    }
    debug!(view = store.name(), "maintenance worker stopped");
}

fn apply_with_retry(store: &IndexStore, stats: &ViewStats, retry: &RetryConfig, op: &PatchOp) {
    let mut delay = Duration::from_millis(retry.base_delay_ms);
    let mut attempt = 0usize;
    loop {
        match store.apply(&op.doc_id, &op.emissions) {
            Ok(_) => {
                stats.patches_applied.fetch_add(1, Ordering::Relaxed);
                stats
                    .emissions_indexed
                    .fetch_add(op.emissions.len() as u64, Ordering::Relaxed);
                return;
            }
            // Poisoned index: drop until rebuild. Prior emissions stay
            // visible only in the sense that the whole index is offline.
            Err(IndexError::Unusable { .. }) | Err(IndexError::CorruptionDetected { .. }) => {
                stats.patches_dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    view = store.name(),
                    doc = %op.doc_id,
                    "dropping patch for unusable index, rebuild required"
                );
                return;
            }
            Err(err) => {
                if attempt >= retry.max_retries {
                    stats.patches_dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        view = store.name(),
                        doc = %op.doc_id,
                        error = %err,
                        "patch failed, retries exhausted"
                    );
                    return;
                }
                attempt += 1;
                warn!(
                    view = store.name(),
                    doc = %op.doc_id,
                    attempt,
                    error = %err,
                    "patch failed, retrying with backoff"
                );
                std::thread::sleep(delay);
                delay = (delay * 2).min(Duration::from_millis(retry.max_delay_ms));
            }
        }
    }
}

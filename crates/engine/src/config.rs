//! Engine configuration

use vantage_core::Limits;

/// Retry policy for the index maintenance worker.
///
/// A patch that fails retryably is requeued with exponential backoff; the
/// document's prior emissions stay visible (stale but consistent) until the
/// retry succeeds.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// A RetryConfig with no retries (fail fast).
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extraction resource limits.
    pub limits: Limits,
    /// Maintenance retry policy.
    pub retry: RetryConfig,
    /// Rows folded per chunk during reduce. Partial aggregates over chunks
    /// are merged with the view's combine, which bounds how long any one
    /// fold runs over a snapshot.
    pub reduce_chunk: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            retry: RetryConfig::default(),
            reduce_chunk: 1024,
        }
    }
}

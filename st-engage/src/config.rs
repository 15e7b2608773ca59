//! Engine tuning knobs

use std::time::Duration;

/// Reconciliation engine tuning
///
/// Constructed once and handed to [`crate::InteractionEngine::new`]. The
/// defaults match production behavior; tests shrink the timers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Baseline likes count for a subject never seen before
    pub initial_likes_count: i64,
    /// Hard timeout for mutating requests; writes are never retried
    /// automatically (a duplicated toggle would flip state twice)
    pub mutate_timeout: Duration,
    /// Timeout per attempt for authoritative reads
    pub fetch_timeout: Duration,
    /// Additional attempts for reads that fail with a retryable error
    pub fetch_retries: u32,
    /// Base delay before a read retry; doubles per attempt
    pub retry_backoff: Duration,
    /// Period of the background resynchronization sweep
    pub resync_interval: Duration,
    /// Quiet window collapsing bursts of resync triggers into one call
    pub resync_debounce: Duration,
    /// Maximum accepted comment length in characters
    pub max_comment_len: usize,
    /// Event bus buffer size per subscriber
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_likes_count: 0,
            mutate_timeout: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(10),
            fetch_retries: 2,
            retry_backoff: Duration::from_millis(250),
            resync_interval: Duration::from_secs(30),
            resync_debounce: Duration::from_millis(300),
            max_comment_len: 500,
            event_capacity: 100,
        }
    }
}

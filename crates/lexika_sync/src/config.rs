//! Configuration for the sync orchestrator.

use std::time::Duration;

/// Configuration for sync runs.
///
/// The defaults mirror the behavior hosts tend to want out of the box:
/// five upload attempts per operation, a ten-record first page so the UI
/// unblocks quickly, and fifty-record background batches.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed upload attempts after which an operation is discarded.
    pub retry_ceiling: u32,
    /// Size of the progressive loader's latency-critical first page.
    pub first_page_size: usize,
    /// Batch size for the progressive loader's background phase.
    pub background_batch_size: usize,
    /// Interval for periodic sync, if the host runs the scheduler.
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    /// Creates a configuration with default parameters.
    pub fn new() -> Self {
        Self {
            retry_ceiling: 5,
            first_page_size: 10,
            background_batch_size: 50,
            sync_interval: None,
        }
    }

    /// Sets the retry ceiling.
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    /// Sets the first page size.
    pub fn with_first_page_size(mut self, size: usize) -> Self {
        self.first_page_size = size;
        self
    }

    /// Sets the background batch size.
    pub fn with_background_batch_size(mut self, size: usize) -> Self {
        self.background_batch_size = size;
        self
    }

    /// Sets the periodic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

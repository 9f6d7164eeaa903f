//! Router configuration.

use crate::dedupe::DEFAULT_DEDUPE_CAPACITY;
use crate::diagnostics::DEFAULT_DIAGNOSTICS_CAPACITY;
use crate::dispatch::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DispatchConfig};
use crate::error::{Error, Result};
use crate::pipeline::PipelineConfig;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::unmatched::DEFAULT_UNMATCHED_THRESHOLD;
use herald_core::MAX_INLINE_EVENT_BYTES;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every knob of the router in one place.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum queued messages before the oldest is dropped.
    pub queue_capacity: usize,
    /// Messages per dispatch batch.
    pub batch_size: usize,
    /// Pause between batches in milliseconds.
    pub batch_delay_ms: u64,
    /// Event ids remembered by the dedupe cache.
    pub dedupe_capacity: usize,
    /// Fraction of capacity at which the cache reports near-capacity.
    pub near_capacity_threshold: f64,
    /// Consecutive unmatched events before a subscription is flagged.
    pub unmatched_threshold: u32,
    /// Largest serialized event carried inline in a delivery URI.
    pub max_inline_event_bytes: usize,
    /// Verify event signatures.
    pub verify_signatures: bool,
    /// Buffered diagnostic records.
    pub diagnostics_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY.as_millis() as u64,
            dedupe_capacity: DEFAULT_DEDUPE_CAPACITY,
            near_capacity_threshold: 0.9,
            unmatched_threshold: DEFAULT_UNMATCHED_THRESHOLD,
            max_inline_event_bytes: MAX_INLINE_EVENT_BYTES,
            verify_signatures: false,
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

impl RouterConfig {
    /// Reject values that would make the router misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.dedupe_capacity == 0 {
            return Err(Error::Config("dedupe_capacity must be at least 1".to_string()));
        }
        if !(self.near_capacity_threshold > 0.0 && self.near_capacity_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "near_capacity_threshold must be in (0, 1], got {}",
                self.near_capacity_threshold
            )));
        }
        if self.unmatched_threshold == 0 {
            return Err(Error::Config(
                "unmatched_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            verify_signatures: self.verify_signatures,
            max_inline_event_bytes: self.max_inline_event_bytes,
            unmatched_threshold: self.unmatched_threshold,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

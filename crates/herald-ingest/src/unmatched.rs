//! Per-subscription counters of consecutive unrouted events.
//!
//! An event counts as unmatched when it got past dedupe and the local
//! exclusion filters but was still not routed (keyword miss, delivery build
//! failure). A routed event resets the counter. Once a counter reaches the
//! threshold the subscription is a cancellation candidate; the lifecycle
//! collaborator decides what to do with that.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Default number of consecutive unmatched events before a subscription is
/// flagged.
pub const DEFAULT_UNMATCHED_THRESHOLD: u32 = 5;

/// Result of recording an unmatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmatchedSignal {
    /// Consecutive unmatched events so far.
    pub count: u32,
    /// True when the counter is at or above the threshold.
    pub cancellation_candidate: bool,
    /// True only for the event that crossed the threshold.
    pub newly_tripped: bool,
}

/// Thread-safe unmatched-event counters keyed by subscription id.
pub struct UnmatchedTracker {
    counts: Mutex<HashMap<String, u32>>,
    threshold: u32,
}

impl UnmatchedTracker {
    /// Create a tracker. A threshold of zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            threshold: threshold.max(1),
        }
    }

    /// Count one more unmatched event for `subscription_id`.
    pub fn record_unmatched(&self, subscription_id: &str) -> UnmatchedSignal {
        let mut counts = self.counts.lock();
        let count = counts.entry(subscription_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);

        UnmatchedSignal {
            count: *count,
            cancellation_candidate: *count >= self.threshold,
            newly_tripped: *count == self.threshold,
        }
    }

    /// Reset the counter after a routed event.
    pub fn reset(&self, subscription_id: &str) {
        if let Some(count) = self.counts.lock().get_mut(subscription_id) {
            *count = 0;
        }
    }

    /// Drop all state for a subscription (e.g. after it was cancelled).
    pub fn forget(&self, subscription_id: &str) {
        self.counts.lock().remove(subscription_id);
    }

    /// Current counter for a subscription.
    pub fn count(&self, subscription_id: &str) -> u32 {
        self.counts
            .lock()
            .get(subscription_id)
            .copied()
            .unwrap_or(0)
    }

    /// True when the subscription's counter is at or above the threshold.
    pub fn is_cancellation_candidate(&self, subscription_id: &str) -> bool {
        self.count(subscription_id) >= self.threshold
    }

    /// Every subscription currently at or above the threshold, sorted.
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .counts
            .lock()
            .iter()
            .filter(|(_, count)| **count >= self.threshold)
            .map(|(sub, _)| sub.clone())
            .collect();
        out.sort();
        out
    }

    /// The configured threshold.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for UnmatchedTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UNMATCHED_THRESHOLD)
    }
}

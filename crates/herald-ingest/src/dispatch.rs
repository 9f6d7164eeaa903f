//! Batch dispatcher.
//!
//! [`Dispatcher::submit`] pushes onto the [`IngestQueue`] and makes sure a
//! dispatch loop is running. At most one loop exists at a time; an
//! `AtomicBool` flipped with compare-exchange decides who starts it.
//!
//! The loop drains up to `batch_size` messages, groups them by relay, runs
//! each group through the [`Pipeline`] as its own tokio task (in arrival
//! order within the group), waits for the batch, sleeps `batch_delay` and
//! repeats. It exits once a drain comes back empty and
//! restarts on the next submit.
//!
//! ```text
//! submit ─┬─> [IngestQueue] ──drain_batch──> spawn per relay ──join──> sleep ─┐
//!         │                        ^                                    │
//!         └─ start loop if idle    └────────────────────────────────────┘
//! ```

use crate::diagnostics::DiagnosticEvent;
use crate::pipeline::{Outcome, Pipeline};
use crate::queue::{IngestQueue, QueuedMessage};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Default messages per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(10);

/// Dispatch loop tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Messages drained per iteration.
    pub batch_size: usize,
    /// Pause after each batch.
    pub batch_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

struct Inner {
    queue: Arc<IngestQueue>,
    pipeline: Arc<Pipeline>,
    config: DispatchConfig,
    runtime: Handle,
    active: AtomicBool,
    idle: Notify,
}

/// Feeds queued messages to the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher that runs its loop on `runtime`.
    pub fn new(
        queue: Arc<IngestQueue>,
        pipeline: Arc<Pipeline>,
        config: DispatchConfig,
        runtime: Handle,
    ) -> Self {
        let config = DispatchConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                queue,
                pipeline,
                config,
                runtime,
                active: AtomicBool::new(false),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue a raw message. Never blocks and never fails.
    ///
    /// When the queue is full its oldest message is discarded.
    pub fn submit(
        &self,
        raw: impl Into<String>,
        subscription_id: impl Into<String>,
        relay_url: impl Into<String>,
    ) {
        let diagnostics = self.inner.pipeline.diagnostics();
        diagnostics.record(DiagnosticEvent::Submitted);

        let message = QueuedMessage::new(raw, subscription_id, relay_url);
        if let Some(evicted) = self.inner.queue.push(message) {
            tracing::debug!(
                "Ingest queue full, dropped oldest message from {} ({}) queued {:?} ago",
                evicted.relay_url,
                evicted.subscription_id,
                evicted.enqueued_at.elapsed()
            );
            diagnostics.record(DiagnosticEvent::QueueOverflow {
                relay_url: evicted.relay_url,
            });
        }

        Inner::ensure_running(&self.inner);
    }

    /// True while a dispatch loop is running.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Messages waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Resolve once the queue is empty and no loop is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_active() && self.inner.queue.is_empty() {
                return;
            }
            // Re-check periodically in case a wakeup raced the flag.
            let _ = tokio::time::timeout(Duration::from_millis(50), notified).await;
        }
    }
}

impl Inner {
    fn ensure_running(this: &Arc<Self>) {
        if this
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(this);
            this.runtime.spawn(async move { inner.run().await });
        }
    }

    async fn run(self: Arc<Self>) {
        tracing::trace!("Dispatch loop started");

        loop {
            let batch = self.queue.drain_batch(self.config.batch_size);
            if batch.is_empty() {
                self.active.store(false, Ordering::SeqCst);
                self.idle.notify_waiters();

                // A submit between the drain and the store saw the flag set
                // and didn't start a loop. Pick its message up here.
                if self.queue.is_empty()
                    || self
                        .active
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    tracing::trace!("Dispatch loop idle");
                    return;
                }
                continue;
            }

            self.process_batch(batch).await;
            self.record_occupancy();
            tokio::time::sleep(self.config.batch_delay).await;
        }
    }

    /// Run one drained batch. Messages from the same relay stay on one task
    /// and go through the pipeline in arrival order; relays run in parallel.
    async fn process_batch(&self, batch: Vec<QueuedMessage>) {
        let tasks: Vec<_> = group_by_relay(batch)
            .into_iter()
            .map(|group| {
                let pipeline = Arc::clone(&self.pipeline);
                self.runtime.spawn(async move {
                    for message in &group {
                        process_one(&pipeline, message);
                    }
                })
            })
            .collect();

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Dispatch task failed: {}", e);
                self.pipeline
                    .diagnostics()
                    .record(DiagnosticEvent::DispatchError {
                        reason: e.to_string(),
                    });
            }
        }
    }

    fn record_occupancy(&self) {
        let dedupe = self.pipeline.dedupe();
        let capacity = dedupe.capacity();
        let entries = dedupe.len();
        self.pipeline.diagnostics().record(DiagnosticEvent::Occupancy {
            queue_depth: self.queue.len(),
            cache_entries: entries,
            cache_utilization: entries as f64 / capacity as f64,
        });
    }
}

/// Split a batch into per-relay runs, keeping arrival order inside each
/// run and ordering runs by first appearance.
fn group_by_relay(batch: Vec<QueuedMessage>) -> Vec<Vec<QueuedMessage>> {
    let mut groups: Vec<Vec<QueuedMessage>> = Vec::new();
    for message in batch {
        match groups
            .iter_mut()
            .find(|g| g[0].relay_url == message.relay_url)
        {
            Some(group) => group.push(message),
            None => groups.push(vec![message]),
        }
    }
    groups
}

/// Run one message, turning errors and panics into diagnostics so the rest
/// of its relay group still runs.
fn process_one(pipeline: &Pipeline, message: &QueuedMessage) {
    let reason = match panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(message))) {
        Ok(Ok(Outcome::Dropped(reason))) => {
            tracing::trace!("Message dropped: {}", reason.label());
            return;
        }
        Ok(Ok(_)) => return,
        Ok(Err(e)) => {
            tracing::error!("Error processing message from {}: {}", message.relay_url, e);
            e.to_string()
        }
        Err(payload) => {
            let what = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                "Pipeline panicked on message from {}: {}",
                message.relay_url,
                what
            );
            format!("panic: {what}")
        }
    };
    pipeline
        .diagnostics()
        .record(DiagnosticEvent::DispatchError { reason });
}

//! Best-effort observability channel.
//!
//! The pipeline reports what happened to each message as a
//! [`DiagnosticEvent`]. Records go through a bounded `crossbeam_channel`
//! with `try_send`, so a slow or missing consumer can never stall ingestion:
//! when the channel is full the record is discarded and counted.
//!
//! A [`DiagnosticsWorker`] drains the channel on its own thread and turns
//! records into Prometheus counters.
//!
//! ```text
//! [Pipeline] --try_send--> (bounded channel) --> [DiagnosticsWorker] --> metrics
//! ```

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use herald_core::metrics::{increment, increment_labeled, set_counter, set_gauge};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default number of buffered diagnostic records.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 1024;

/// Where a duplicate was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateStage {
    /// `has_seen` pre-check before marking.
    Precheck,
    /// `mark_seen` lost a race with another message.
    Mark,
}

impl DuplicateStage {
    fn label(self) -> &'static str {
        match self {
            Self::Precheck => "precheck",
            Self::Mark => "mark",
        }
    }
}

/// Something worth counting.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// A message was accepted by `submit`.
    Submitted,
    /// The ingest queue discarded its oldest message.
    QueueOverflow { relay_url: String },
    /// Unparseable message or structurally invalid event.
    ParseError { relay_url: String, reason: String },
    /// Duplicate event dropped.
    Duplicate { stage: DuplicateStage },
    /// Event dropped for an expected reason.
    Dropped { reason: &'static str },
    /// Event handed to the delivery sink.
    Routed { configuration_id: String },
    /// Subscription/configuration consistency violation.
    CriticalViolation {
        subscription_id: String,
        configuration_id: Option<String>,
    },
    /// A subscription crossed the unmatched-event threshold.
    CancellationCandidate { subscription_id: String, unmatched: u32 },
    /// Delivery URI could not be built.
    DeliveryBuildFailed { configuration_id: String },
    /// A message failed or panicked inside the dispatcher.
    DispatchError { reason: String },
    /// A non-event message was handled.
    Control { kind: &'static str },
    /// Snapshot of queue and cache occupancy.
    Occupancy {
        queue_depth: usize,
        cache_entries: usize,
        cache_utilization: f64,
    },
}

/// Cheap, cloneable handle for recording diagnostics.
#[derive(Clone)]
pub struct Diagnostics {
    sender: Option<Sender<DiagnosticEvent>>,
    dropped: Arc<AtomicU64>,
}

impl Diagnostics {
    /// Create a handle and the worker that consumes it.
    pub fn channel(capacity: usize) -> (Self, DiagnosticsWorker) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let handle = Self {
            sender: Some(sender),
            dropped: Arc::clone(&dropped),
        };
        let worker = DiagnosticsWorker { receiver, dropped };
        (handle, worker)
    }

    /// A handle that discards every record.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record an event without blocking.
    pub fn record(&self, event: DiagnosticEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records discarded because the channel was full or closed.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumes diagnostic records and updates metrics.
pub struct DiagnosticsWorker {
    receiver: Receiver<DiagnosticEvent>,
    /// Shared with the handles; exported as a counter.
    dropped: Arc<AtomicU64>,
}

impl DiagnosticsWorker {
    /// Start the worker on a dedicated thread.
    ///
    /// The thread exits once every [`Diagnostics`] handle is dropped and
    /// the records they left in the channel have been counted.
    pub fn start(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("herald-diagnostics".to_string())
            .spawn(move || self.run(record_metrics))
    }

    /// Feed records to `on_event` until the channel disconnects.
    ///
    /// `recv_timeout` hands out buffered records before it reports the
    /// disconnect, so nothing recorded before the last handle dropped is
    /// lost.
    pub fn run(self, mut on_event: impl FnMut(&DiagnosticEvent)) {
        tracing::debug!("Diagnostics worker started");

        loop {
            match self.receiver.recv_timeout(Duration::from_secs(1)) {
                Ok(event) => on_event(&event),
                Err(RecvTimeoutError::Timeout) => {
                    set_counter(
                        "herald_diagnostics_dropped_total",
                        self.dropped.load(Ordering::Relaxed),
                    );
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let dropped = self.dropped.load(Ordering::Relaxed);
        set_counter("herald_diagnostics_dropped_total", dropped);
        if dropped > 0 {
            tracing::warn!("Diagnostics channel dropped {} records", dropped);
        }

        tracing::debug!("Diagnostics worker stopped");
    }

    /// Drain everything currently buffered without recording metrics.
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        self.receiver.try_iter().collect()
    }
}

fn record_metrics(event: &DiagnosticEvent) {
    match event {
        DiagnosticEvent::Submitted => increment("herald_messages_submitted_total", 1),
        DiagnosticEvent::QueueOverflow { .. } => increment("herald_queue_overflow_total", 1),
        DiagnosticEvent::ParseError { .. } => increment("herald_parse_errors_total", 1),
        DiagnosticEvent::Duplicate { stage } => {
            increment_labeled("herald_duplicates_total", "stage", stage.label())
        }
        DiagnosticEvent::Dropped { reason } => {
            increment_labeled("herald_events_dropped_total", "reason", *reason)
        }
        DiagnosticEvent::Routed { .. } => increment("herald_events_routed_total", 1),
        DiagnosticEvent::CriticalViolation { .. } => {
            increment("herald_critical_violations_total", 1)
        }
        DiagnosticEvent::CancellationCandidate { .. } => {
            increment("herald_cancellation_candidates_total", 1)
        }
        DiagnosticEvent::DeliveryBuildFailed { .. } => {
            increment("herald_delivery_build_failures_total", 1)
        }
        DiagnosticEvent::DispatchError { .. } => increment("herald_dispatch_errors_total", 1),
        DiagnosticEvent::Control { kind } => {
            increment_labeled("herald_control_messages_total", "kind", *kind)
        }
        DiagnosticEvent::Occupancy {
            queue_depth,
            cache_entries,
            cache_utilization,
        } => {
            set_gauge("herald_queue_depth", *queue_depth as f64);
            set_gauge("herald_dedupe_entries", *cache_entries as f64);
            set_gauge("herald_dedupe_utilization_ratio", *cache_utilization);
        }
    }
}

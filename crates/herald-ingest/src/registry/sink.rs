//! Delivery sinks.

use super::{Configuration, DeliverySink};
use chrono::{DateTime, Utc};
use herald_core::Event;
use parking_lot::Mutex;
use url::Url;

/// Sink that logs each delivery at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DeliverySink for LogSink {
    fn deliver(&self, event: &Event, uri: &Url, configuration: &Configuration, subscription_id: &str) {
        let created = i64::try_from(event.created_at)
            .ok()
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| event.created_at.to_string());

        tracing::info!(
            event_id = %event.id,
            configuration_id = %configuration.id,
            subscription_id = %subscription_id,
            "Delivering kind {} event from {} to {} ({} byte URI)",
            event.kind,
            created,
            configuration.name,
            uri.as_str().len()
        );
        tracing::trace!("Delivery URI for {}: {}", event.id, uri);
    }
}

/// One delivery captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub event_id: String,
    pub uri: String,
    pub configuration_id: String,
    pub subscription_id: String,
}

/// Sink that keeps every delivery in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every delivery so far, in delivery order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Number of deliveries.
    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }

    /// Deliveries of one event id.
    pub fn count_for(&self, event_id: &str) -> usize {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| d.event_id == event_id)
            .count()
    }
}

impl DeliverySink for RecordingSink {
    fn deliver(&self, event: &Event, uri: &Url, configuration: &Configuration, subscription_id: &str) {
        self.deliveries.lock().push(Delivery {
            event_id: event.id.clone(),
            uri: uri.to_string(),
            configuration_id: configuration.id.clone(),
            subscription_id: subscription_id.to_string(),
        });
    }
}

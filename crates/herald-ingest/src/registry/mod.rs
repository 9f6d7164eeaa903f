//! Collaborator interfaces consumed by the pipeline.
//!
//! The pipeline never owns subscriptions, configurations or delivery; it
//! reaches them through these traits, passed in at construction.
//!
//! - [`SubscriptionRegistry`] - which subscriptions are live, their bound
//!   configuration, and per-relay timestamp cursors
//! - [`ConfigurationRegistry`] - configuration lookup by id
//! - [`DeliverySink`] - receives routed events
//!
//! In-memory implementations are provided for the replay binary and tests.

mod configuration;
mod memory;
mod sink;

pub use configuration::{Configuration, EventFilter};
pub use memory::{MemoryConfigurationRegistry, MemorySubscriptionRegistry};
pub use sink::{Delivery, LogSink, RecordingSink};

use herald_core::Event;
use std::sync::Arc;
use url::Url;

/// Live subscription state owned by the connection lifecycle layer.
pub trait SubscriptionRegistry: Send + Sync {
    /// True while the subscription is registered.
    fn is_active(&self, subscription_id: &str) -> bool;

    /// Configuration the subscription is bound to.
    fn configuration_id(&self, subscription_id: &str) -> Option<String>;

    /// Timestamp of the last processed event from `relay_url`.
    fn relay_timestamp(&self, subscription_id: &str, relay_url: &str) -> Option<u64>;

    /// Record the timestamp of a processed event from `relay_url`.
    fn set_relay_timestamp(&self, subscription_id: &str, relay_url: &str, timestamp: u64);

    /// Historical replay finished for the subscription (EOSE received).
    fn mark_caught_up(&self, subscription_id: &str);
}

/// Read access to user configurations.
pub trait ConfigurationRegistry: Send + Sync {
    /// Look up a configuration snapshot.
    fn by_id(&self, id: &str) -> Option<Arc<Configuration>>;
}

/// Receives routed events. Fire-and-forget: failures are the sink's problem.
pub trait DeliverySink: Send + Sync {
    /// Deliver one routed event.
    fn deliver(&self, event: &Event, uri: &Url, configuration: &Configuration, subscription_id: &str);
}

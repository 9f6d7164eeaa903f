//! In-memory registries backed by `parking_lot::RwLock`.

use super::{Configuration, ConfigurationRegistry, SubscriptionRegistry};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct SubscriptionState {
    /// subscription id -> configuration id
    bindings: HashMap<String, String>,
    caught_up: HashSet<String>,
    /// (subscription id, relay url) -> created_at
    cursors: HashMap<(String, String), u64>,
}

/// Subscription registry held in memory.
#[derive(Default)]
pub struct MemorySubscriptionRegistry {
    state: RwLock<SubscriptionState>,
}

impl MemorySubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active subscription bound to a configuration.
    pub fn register(&self, subscription_id: impl Into<String>, configuration_id: impl Into<String>) {
        let subscription_id = subscription_id.into();
        let configuration_id = configuration_id.into();
        tracing::debug!(
            subscription_id = %subscription_id,
            configuration_id = %configuration_id,
            "subscription registered"
        );
        self.state
            .write()
            .bindings
            .insert(subscription_id, configuration_id);
    }

    /// Tear down a subscription. Its cursors and caught-up flag go with it.
    pub fn unregister(&self, subscription_id: &str) {
        let mut state = self.state.write();
        state.bindings.remove(subscription_id);
        state.caught_up.remove(subscription_id);
        state.cursors.retain(|(sub, _), _| sub != subscription_id);
    }

    /// True once EOSE was seen for the subscription.
    pub fn is_caught_up(&self, subscription_id: &str) -> bool {
        self.state.read().caught_up.contains(subscription_id)
    }

    /// Number of active subscriptions.
    pub fn active_count(&self) -> usize {
        self.state.read().bindings.len()
    }
}

impl SubscriptionRegistry for MemorySubscriptionRegistry {
    fn is_active(&self, subscription_id: &str) -> bool {
        self.state.read().bindings.contains_key(subscription_id)
    }

    fn configuration_id(&self, subscription_id: &str) -> Option<String> {
        self.state.read().bindings.get(subscription_id).cloned()
    }

    fn relay_timestamp(&self, subscription_id: &str, relay_url: &str) -> Option<u64> {
        self.state
            .read()
            .cursors
            .get(&(subscription_id.to_string(), relay_url.to_string()))
            .copied()
    }

    fn set_relay_timestamp(&self, subscription_id: &str, relay_url: &str, timestamp: u64) {
        self.state.write().cursors.insert(
            (subscription_id.to_string(), relay_url.to_string()),
            timestamp,
        );
    }

    fn mark_caught_up(&self, subscription_id: &str) {
        // Same guard for the check and the insert, or a concurrent
        // unregister could leave a flag behind.
        let mut state = self.state.write();
        if state.bindings.contains_key(subscription_id) {
            state.caught_up.insert(subscription_id.to_string());
        }
    }
}

/// Configuration registry held in memory.
#[derive(Default)]
pub struct MemoryConfigurationRegistry {
    configurations: RwLock<HashMap<String, Arc<Configuration>>>,
}

impl MemoryConfigurationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a configuration.
    pub fn upsert(&self, configuration: Configuration) {
        self.configurations
            .write()
            .insert(configuration.id.clone(), Arc::new(configuration));
    }

    /// Remove a configuration.
    pub fn remove(&self, id: &str) -> Option<Arc<Configuration>> {
        self.configurations.write().remove(id)
    }

    /// Snapshot of every configuration, sorted by id.
    pub fn all(&self) -> Vec<Arc<Configuration>> {
        let mut all: Vec<_> = self.configurations.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

impl ConfigurationRegistry for MemoryConfigurationRegistry {
    fn by_id(&self, id: &str) -> Option<Arc<Configuration>> {
        self.configurations.read().get(id).cloned()
    }
}

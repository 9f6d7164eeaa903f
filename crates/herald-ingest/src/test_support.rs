//! Shared fixtures for unit tests.

use crate::dedupe::DedupeCache;
use crate::diagnostics::{DiagnosticEvent, Diagnostics, DiagnosticsWorker};
use crate::pipeline::{Outcome, Pipeline, PipelineConfig, PipelineDeps};
use crate::queue::QueuedMessage;
use crate::registry::{
    Configuration, ConfigurationRegistry, MemoryConfigurationRegistry, MemorySubscriptionRegistry,
    RecordingSink,
};
use herald_core::Event;
use std::sync::Arc;

pub const SUBSCRIPTION: &str = "sub-1";
pub const OTHER_SUBSCRIPTION: &str = "sub-2";
pub const CONFIGURATION: &str = "cfg-1";
pub const RELAY: &str = "wss://relay.example";

const SECRET: [u8; 32] = [7u8; 32];

/// A validly signed text note.
pub fn signed_event(content: &str, tags: Vec<Vec<String>>) -> Event {
    resign(Event {
        id: String::new(),
        pubkey: String::new(),
        created_at: 1_700_000_000,
        kind: 1,
        tags,
        content: content.to_string(),
        sig: String::new(),
    })
}

/// Re-sign after editing fields.
pub fn resign(mut event: Event) -> Event {
    event.sign(&SECRET).unwrap();
    event
}

/// Public key that signs every fixture event.
pub fn author_pubkey() -> String {
    signed_event("", vec![]).pubkey
}

/// `["EVENT", <subscription>, <event>]`
pub fn event_message(subscription_id: &str, event: &Event) -> String {
    serde_json::json!(["EVENT", subscription_id, event]).to_string()
}

/// Enabled configuration bound to [`SUBSCRIPTION`].
pub fn base_configuration() -> Configuration {
    let mut config = Configuration::new(CONFIGURATION, "Test", "https://app.example/open");
    config.subscription_id = Some(SUBSCRIPTION.to_string());
    config
}

/// In-memory registries with [`SUBSCRIPTION`] bound to [`CONFIGURATION`].
pub fn registries(
    configure: impl FnOnce(&mut Configuration),
) -> (Arc<MemorySubscriptionRegistry>, Arc<MemoryConfigurationRegistry>) {
    let subscriptions = Arc::new(MemorySubscriptionRegistry::new());
    subscriptions.register(SUBSCRIPTION, CONFIGURATION);

    let mut config = base_configuration();
    configure(&mut config);
    let configurations = Arc::new(MemoryConfigurationRegistry::new());
    configurations.upsert(config);

    (subscriptions, configurations)
}

/// A pipeline wired to in-memory collaborators.
pub struct Harness {
    pub pipeline: Pipeline,
    pub subscriptions: Arc<MemorySubscriptionRegistry>,
    pub configurations: Arc<MemoryConfigurationRegistry>,
    pub sink: Arc<RecordingSink>,
    pub dedupe: Arc<DedupeCache>,
    worker: DiagnosticsWorker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default(), |_| {})
    }

    pub fn with_configuration(configure: impl FnOnce(&mut Configuration)) -> Self {
        Self::with_config(PipelineConfig::default(), configure)
    }

    pub fn with_config(config: PipelineConfig, configure: impl FnOnce(&mut Configuration)) -> Self {
        let (subscriptions, configurations) = registries(configure);
        let sink = Arc::new(RecordingSink::new());
        let dedupe = Arc::new(DedupeCache::new(500));
        let (diagnostics, worker) = Diagnostics::channel(1024);

        let pipeline = Pipeline::new(
            PipelineDeps {
                dedupe: Arc::clone(&dedupe),
                subscriptions: subscriptions.clone(),
                configurations: configurations.clone(),
                sink: sink.clone(),
                diagnostics,
            },
            config,
        );

        Self {
            pipeline,
            subscriptions,
            configurations,
            sink,
            dedupe,
            worker,
        }
    }

    /// Current copy of the bound configuration.
    pub fn configuration(&self) -> Configuration {
        self.configurations
            .by_id(CONFIGURATION)
            .map(|c| (*c).clone())
            .unwrap_or_else(base_configuration)
    }

    pub fn submit(&self, raw: &str) -> Outcome {
        self.submit_as(raw, SUBSCRIPTION, RELAY)
    }

    pub fn submit_from(&self, raw: &str, relay_url: &str) -> Outcome {
        self.submit_as(raw, SUBSCRIPTION, relay_url)
    }

    pub fn submit_on(&self, raw: &str, subscription_id: &str) -> Outcome {
        self.submit_as(raw, subscription_id, RELAY)
    }

    fn submit_as(&self, raw: &str, subscription_id: &str, relay_url: &str) -> Outcome {
        self.pipeline
            .process(&QueuedMessage::new(raw, subscription_id, relay_url))
            .unwrap()
    }

    /// Everything recorded on the diagnostics channel so far.
    pub fn diagnostics_drained(&self) -> Vec<DiagnosticEvent> {
        self.worker.drain()
    }
}

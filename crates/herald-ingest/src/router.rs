//! Public facade over the cache, queue, pipeline and dispatcher.
//!
//! Connection code calls [`Router::submit`] for every relay message; the
//! lifecycle layer reads cache occupancy and unmatched counters back out.

use crate::config::RouterConfig;
use crate::dedupe::{DedupeCache, DedupeStats};
use crate::diagnostics::Diagnostics;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineDeps};
use crate::queue::IngestQueue;
use crate::registry::{ConfigurationRegistry, DeliverySink, SubscriptionRegistry};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;

/// External collaborators the router consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub subscriptions: Arc<dyn SubscriptionRegistry>,
    pub configurations: Arc<dyn ConfigurationRegistry>,
    pub sink: Arc<dyn DeliverySink>,
}

/// Deduplicating event router.
pub struct Router {
    config: RouterConfig,
    dedupe: Arc<DedupeCache>,
    queue: Arc<IngestQueue>,
    pipeline: Arc<Pipeline>,
    dispatcher: Dispatcher,
}

impl Router {
    /// Build a router with an empty dedupe cache.
    pub fn new(
        config: RouterConfig,
        collaborators: Collaborators,
        diagnostics: Diagnostics,
        runtime: Handle,
    ) -> Result<Self> {
        let dedupe = DedupeCache::new(config.dedupe_capacity);
        Self::with_dedupe(config, dedupe, collaborators, diagnostics, runtime)
    }

    /// Build a router around an existing cache, e.g. one loaded from a snapshot.
    pub fn with_dedupe(
        config: RouterConfig,
        dedupe: DedupeCache,
        collaborators: Collaborators,
        diagnostics: Diagnostics,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;

        let dedupe = Arc::new(dedupe);
        let queue = Arc::new(IngestQueue::new(config.queue_capacity));
        let pipeline = Arc::new(Pipeline::new(
            PipelineDeps {
                dedupe: Arc::clone(&dedupe),
                subscriptions: collaborators.subscriptions,
                configurations: collaborators.configurations,
                sink: collaborators.sink,
                diagnostics,
            },
            config.pipeline_config(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&pipeline),
            config.dispatch_config(),
            runtime,
        );

        tracing::debug!(
            "Router ready: queue={}, batch={}x{}ms, dedupe={}",
            config.queue_capacity,
            config.batch_size,
            config.batch_delay_ms,
            dedupe.capacity()
        );

        Ok(Self {
            config,
            dedupe,
            queue,
            pipeline,
            dispatcher,
        })
    }

    /// Accept a raw relay message. Never blocks.
    pub fn submit(
        &self,
        raw: impl Into<String>,
        subscription_id: impl Into<String>,
        relay_url: impl Into<String>,
    ) {
        self.dispatcher.submit(raw, subscription_id, relay_url);
    }

    /// Resolve once every submitted message has been processed.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // -- dedupe cache --

    pub fn cache_stats(&self) -> DedupeStats {
        self.dedupe.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.dedupe.len()
    }

    /// True once the cache is past the configured near-capacity fraction.
    pub fn is_cache_near_capacity(&self) -> bool {
        self.dedupe
            .is_near_capacity(self.config.near_capacity_threshold)
    }

    pub fn clear_cache(&self) {
        self.dedupe.clear();
    }

    /// Evict oldest ids down to `target_size`. Returns how many were evicted.
    pub fn compact_cache(&self, target_size: usize) -> usize {
        self.dedupe.compact(target_size)
    }

    /// The newest `count` ids, oldest first.
    pub fn recent_event_ids(&self, count: usize) -> Vec<String> {
        self.dedupe.recent_ids(count)
    }

    pub fn has_seen(&self, event_id: &str) -> bool {
        self.dedupe.has_seen(event_id)
    }

    /// Write the cache to `path` so dedupe survives a restart.
    pub fn save_dedupe_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.dedupe.save_snapshot(path)
    }

    // -- unmatched tracking --

    pub fn unmatched_count(&self, subscription_id: &str) -> u32 {
        self.pipeline.unmatched().count(subscription_id)
    }

    pub fn is_cancellation_candidate(&self, subscription_id: &str) -> bool {
        self.pipeline
            .unmatched()
            .is_cancellation_candidate(subscription_id)
    }

    /// Subscriptions currently flagged, sorted.
    pub fn cancellation_candidates(&self) -> Vec<String> {
        self.pipeline.unmatched().candidates()
    }

    /// Forget the unmatched counter of a torn-down subscription.
    pub fn forget_subscription(&self, subscription_id: &str) {
        self.pipeline.unmatched().forget(subscription_id);
    }

    // -- queue --

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Messages discarded by drop-oldest overflow.
    pub fn queue_dropped_total(&self) -> u64 {
        self.queue.dropped_total()
    }

    /// Diagnostic records lost to a full channel.
    pub fn diagnostics_dropped_total(&self) -> u64 {
        self.pipeline.diagnostics().dropped_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RecordingSink;
    use crate::test_support::{RELAY, SUBSCRIPTION, event_message, registries, signed_event};

    fn router(
        config: RouterConfig,
        configure: impl FnOnce(&mut crate::registry::Configuration),
    ) -> (Router, Arc<RecordingSink>) {
        let (subscriptions, configurations) = registries(configure);
        let sink = Arc::new(RecordingSink::new());
        let router = Router::new(
            config,
            Collaborators {
                subscriptions,
                configurations,
                sink: sink.clone(),
            },
            Diagnostics::disabled(),
            Handle::current(),
        )
        .unwrap();
        (router, sink)
    }

    #[tokio::test]
    async fn test_submit_routes_and_dedupes_across_relays() {
        let (router, sink) = router(RouterConfig::default(), |_| {});
        let event = signed_event("hello", vec![]);
        let raw = event_message(SUBSCRIPTION, &event);

        router.submit(raw.clone(), SUBSCRIPTION, RELAY);
        router.submit(raw.clone(), SUBSCRIPTION, "wss://second.example");
        router.submit(raw, SUBSCRIPTION, "wss://third.example");
        router.wait_idle().await;

        assert_eq!(sink.count_for(&event.id), 1);
        assert!(router.has_seen(&event.id));
        assert_eq!(router.cache_len(), 1);
        assert_eq!(router.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_cache_introspection() {
        let config = RouterConfig {
            dedupe_capacity: 10,
            near_capacity_threshold: 0.8,
            ..Default::default()
        };
        let (router, _sink) = router(config, |_| {});

        let events: Vec<_> = (0..9)
            .map(|i| signed_event(&format!("n{i}"), vec![]))
            .collect();
        for event in &events {
            router.submit(event_message(SUBSCRIPTION, event), SUBSCRIPTION, RELAY);
        }
        router.wait_idle().await;

        let stats = router.cache_stats();
        assert_eq!(stats.current_size, 9);
        assert_eq!(stats.max_size, 10);
        assert!(router.is_cache_near_capacity());

        assert_eq!(router.compact_cache(4), 5);
        assert_eq!(router.recent_event_ids(10).len(), 4);

        router.clear_cache();
        assert_eq!(router.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_counter_exposed() {
        let (router, _sink) = router(RouterConfig::default(), |config| {
            config.keywords = Some(vec!["bitcoin".to_string()]);
        });

        for i in 0..5 {
            let miss = signed_event(&format!("nope {i}"), vec![]);
            router.submit(event_message(SUBSCRIPTION, &miss), SUBSCRIPTION, RELAY);
        }
        router.wait_idle().await;

        assert_eq!(router.unmatched_count(SUBSCRIPTION), 5);
        assert!(router.is_cancellation_candidate(SUBSCRIPTION));
        assert_eq!(router.cancellation_candidates(), vec![SUBSCRIPTION.to_string()]);

        router.forget_subscription(SUBSCRIPTION);
        assert_eq!(router.unmatched_count(SUBSCRIPTION), 0);
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedupe.json");
        let event = signed_event("persisted", vec![]);

        let (first, sink) = router(RouterConfig::default(), |_| {});
        first.submit(event_message(SUBSCRIPTION, &event), SUBSCRIPTION, RELAY);
        first.wait_idle().await;
        first.save_dedupe_snapshot(&path).unwrap();
        assert_eq!(sink.len(), 1);

        let (subscriptions, configurations) = registries(|_| {});
        let sink = Arc::new(RecordingSink::new());
        let second = Router::with_dedupe(
            RouterConfig::default(),
            DedupeCache::load_snapshot(&path, 500).unwrap(),
            Collaborators {
                subscriptions,
                configurations,
                sink: sink.clone(),
            },
            Diagnostics::disabled(),
            Handle::current(),
        )
        .unwrap();
        second.submit(event_message(SUBSCRIPTION, &event), SUBSCRIPTION, RELAY);
        second.wait_idle().await;

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (subscriptions, configurations) = registries(|_| {});
        let result = Router::new(
            RouterConfig {
                batch_size: 0,
                ..Default::default()
            },
            Collaborators {
                subscriptions,
                configurations,
                sink: Arc::new(RecordingSink::new()),
            },
            Diagnostics::disabled(),
            Handle::current(),
        );
        assert!(result.is_err());
    }
}

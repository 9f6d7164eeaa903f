//! Validation and filter pipeline.
//!
//! Every queued message runs through the same fixed sequence of stages,
//! stopping at the first one that rejects it:
//!
//! ```text
//! parse -> control? -> liveness -> configuration -> validate -> dedupe
//!       -> cursor -> exclusions -> keywords -> delivery URI -> sink
//! ```
//!
//! Normal drops are not errors; they come back as [`Outcome::Dropped`] and
//! are logged at trace/debug. Malformed input is logged at warn. A
//! subscription whose configuration doesn't point back at it is a critical
//! violation: logged at error with the offending ids and never delivered.

pub mod delivery;
pub mod exclusion;
pub mod keywords;

use crate::dedupe::DedupeCache;
use crate::diagnostics::{DiagnosticEvent, Diagnostics, DuplicateStage};
use crate::error::{Error, Result};
use crate::queue::QueuedMessage;
use crate::registry::{Configuration, ConfigurationRegistry, DeliverySink, SubscriptionRegistry};
use crate::unmatched::{DEFAULT_UNMATCHED_THRESHOLD, UnmatchedTracker};
use herald_core::{Event, MAX_INLINE_EVENT_BYTES, RelayMessage, validate_event, verify_signature};
use keywords::KeywordMatch;
use std::sync::Arc;

/// Why a message was not routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Raw text was not a relay message.
    Unparseable,
    /// Subscription is not registered.
    InactiveSubscription,
    /// Active subscription has no configuration id.
    UnboundSubscription,
    /// Configuration exists but is disabled.
    ConfigurationDisabled,
    /// Configuration missing or not bound to this subscription.
    CriticalViolation,
    /// Event failed structural or signature validation.
    InvalidEvent,
    /// Event id already in the dedupe cache.
    Duplicate,
    /// Event id was inserted by someone else between check and mark.
    SecondaryDuplicate,
    /// Author tagged themselves.
    SelfMention,
    /// Reply from a filtered author.
    Reply,
    /// Keyword filter rejected the content.
    KeywordMismatch,
    /// Delivery URI could not be built.
    DeliveryBuildFailed,
}

impl DropReason {
    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unparseable => "unparseable",
            Self::InactiveSubscription => "inactive_subscription",
            Self::UnboundSubscription => "unbound_subscription",
            Self::ConfigurationDisabled => "configuration_disabled",
            Self::CriticalViolation => "critical_violation",
            Self::InvalidEvent => "invalid_event",
            Self::Duplicate => "duplicate",
            Self::SecondaryDuplicate => "secondary_duplicate",
            Self::SelfMention => "self_mention",
            Self::Reply => "reply",
            Self::KeywordMismatch => "keyword_mismatch",
            Self::DeliveryBuildFailed => "delivery_build_failed",
        }
    }

    /// True for consistency violations between subscriptions and configurations.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::UnboundSubscription | Self::CriticalViolation)
    }
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handed to the delivery sink.
    Routed {
        configuration_id: String,
        matched_keywords: Vec<String>,
    },
    /// Dropped before delivery.
    Dropped(DropReason),
    /// Non-event message handled by a side-effect handler.
    Control,
}

impl Outcome {
    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Routed { .. })
    }

    /// Drop reason, if dropped.
    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Self::Dropped(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Verify Schnorr signatures after structural validation.
    pub verify_signatures: bool,
    /// Largest serialized event carried inline in a delivery URI.
    pub max_inline_event_bytes: usize,
    /// Consecutive unmatched events before a subscription is flagged.
    pub unmatched_threshold: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_signatures: false,
            max_inline_event_bytes: MAX_INLINE_EVENT_BYTES,
            unmatched_threshold: DEFAULT_UNMATCHED_THRESHOLD,
        }
    }
}

/// Collaborators handed to the pipeline at construction.
#[derive(Clone)]
pub struct PipelineDeps {
    pub dedupe: Arc<DedupeCache>,
    pub subscriptions: Arc<dyn SubscriptionRegistry>,
    pub configurations: Arc<dyn ConfigurationRegistry>,
    pub sink: Arc<dyn DeliverySink>,
    pub diagnostics: Diagnostics,
}

/// The validation and filter pipeline.
///
/// Stateless apart from the shared dedupe cache and the unmatched counters,
/// so one instance is shared by every dispatched task.
pub struct Pipeline {
    deps: PipelineDeps,
    config: PipelineConfig,
    unmatched: UnmatchedTracker,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let unmatched = UnmatchedTracker::new(config.unmatched_threshold);
        Self {
            deps,
            config,
            unmatched,
        }
    }

    /// Run one message through every stage.
    ///
    /// Drops are `Ok`. An `Err` means something unexpected broke while
    /// handling an otherwise valid event.
    pub fn process(&self, message: &QueuedMessage) -> Result<Outcome> {
        let parsed = match RelayMessage::parse(&message.raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    "Unparseable message from {} ({}): {}",
                    message.relay_url,
                    message.subscription_id,
                    e
                );
                self.deps.diagnostics.record(DiagnosticEvent::ParseError {
                    relay_url: message.relay_url.clone(),
                    reason: e.to_string(),
                });
                return Ok(Outcome::Dropped(DropReason::Unparseable));
            }
        };

        let (embedded_subscription, payload) = match parsed {
            RelayMessage::Event {
                subscription_id,
                event,
            } => (subscription_id, event),
            control => {
                self.handle_control(control, message);
                return Ok(Outcome::Control);
            }
        };

        // The id the connection registered under is authoritative.
        let subscription_id = message.subscription_id.as_str();
        if embedded_subscription != subscription_id {
            tracing::debug!(
                "Message from {} names subscription {} but arrived on {}",
                message.relay_url,
                embedded_subscription,
                subscription_id
            );
        }

        if !self.deps.subscriptions.is_active(subscription_id) {
            tracing::trace!("Dropping event for inactive subscription {}", subscription_id);
            return Ok(self.dropped(DropReason::InactiveSubscription));
        }

        let configuration = match self.resolve_configuration(subscription_id) {
            Ok(configuration) => configuration,
            Err(reason) => return Ok(self.dropped(reason)),
        };

        let event = match self.validate(payload, message) {
            Some(event) => event,
            None => return Ok(self.dropped(DropReason::InvalidEvent)),
        };

        if self.deps.dedupe.has_seen(&event.id) {
            tracing::trace!("Duplicate event {} from {}", event.id, message.relay_url);
            return Ok(self.duplicate(DuplicateStage::Precheck, DropReason::Duplicate));
        }
        if !self.deps.dedupe.mark_seen(&event.id) {
            tracing::debug!(
                "Event {} marked by a concurrent message, dropping",
                event.id
            );
            return Ok(self.duplicate(DuplicateStage::Mark, DropReason::SecondaryDuplicate));
        }

        self.deps.subscriptions.set_relay_timestamp(
            subscription_id,
            &message.relay_url,
            event.created_at,
        );

        if let Some(reason) = exclusion::check(&event, &configuration) {
            tracing::debug!(
                "Event {} excluded for {}: {}",
                event.id,
                configuration.id,
                reason.label()
            );
            return Ok(self.dropped(reason));
        }

        let matched_keywords =
            match keywords::match_keywords(&configuration.keyword_list(), &event.content) {
                KeywordMatch::NoMatch => {
                    tracing::debug!(
                        "Event {} matched no keywords for {}",
                        event.id,
                        configuration.id
                    );
                    self.record_unmatched(subscription_id);
                    return Ok(self.dropped(DropReason::KeywordMismatch));
                }
                matched => matched.into_keywords(),
            };

        let built = match delivery::build_delivery_uri(
            &event,
            &configuration,
            self.config.max_inline_event_bytes,
        ) {
            Ok(built) => built,
            Err(Error::Delivery {
                configuration_id,
                reason,
            }) => {
                tracing::error!(
                    event_id = %event.id,
                    configuration_id = %configuration_id,
                    "Failed to build delivery URI: {}",
                    reason
                );
                self.deps
                    .diagnostics
                    .record(DiagnosticEvent::DeliveryBuildFailed { configuration_id });
                self.record_unmatched(subscription_id);
                return Ok(Outcome::Dropped(DropReason::DeliveryBuildFailed));
            }
            Err(e) => return Err(e),
        };

        self.deps
            .sink
            .deliver(&event, &built.uri, &configuration, subscription_id);
        self.unmatched.reset(subscription_id);
        self.deps.diagnostics.record(DiagnosticEvent::Routed {
            configuration_id: configuration.id.clone(),
        });

        tracing::debug!(
            "Routed event {} to {} ({:?}, keywords: {:?})",
            event.id,
            configuration.id,
            built.payload,
            matched_keywords
        );

        Ok(Outcome::Routed {
            configuration_id: configuration.id.clone(),
            matched_keywords,
        })
    }

    /// Unmatched-event counters.
    pub fn unmatched(&self) -> &UnmatchedTracker {
        &self.unmatched
    }

    /// Shared dedupe cache.
    pub fn dedupe(&self) -> &Arc<DedupeCache> {
        &self.deps.dedupe
    }

    /// Diagnostics handle.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.deps.diagnostics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn handle_control(&self, message: RelayMessage, queued: &QueuedMessage) {
        let kind = message.label();
        match message {
            RelayMessage::Eose { subscription_id } => {
                tracing::debug!(
                    "EOSE from {} for {}, historical replay done",
                    queued.relay_url,
                    subscription_id
                );
                self.deps
                    .subscriptions
                    .mark_caught_up(&queued.subscription_id);
            }
            RelayMessage::Notice { message } => {
                tracing::debug!("Relay {} notice: {}", queued.relay_url, message);
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                if accepted {
                    tracing::debug!("Relay {} accepted {}", queued.relay_url, event_id);
                } else {
                    tracing::debug!(
                        "Relay {} rejected {}: {}",
                        queued.relay_url,
                        event_id,
                        message
                    );
                }
            }
            RelayMessage::Unknown { kind } => {
                tracing::trace!("Ignoring {} message from {}", kind, queued.relay_url);
            }
            RelayMessage::Event { .. } => {}
        }
        self.deps.diagnostics.record(DiagnosticEvent::Control { kind });
    }

    /// Resolve the bound configuration and check it points back at the
    /// subscription delivering the message.
    fn resolve_configuration(
        &self,
        subscription_id: &str,
    ) -> std::result::Result<Arc<Configuration>, DropReason> {
        let Some(configuration_id) = self.deps.subscriptions.configuration_id(subscription_id)
        else {
            self.critical(subscription_id, None, "active subscription has no configuration");
            return Err(DropReason::UnboundSubscription);
        };

        let Some(configuration) = self.deps.configurations.by_id(&configuration_id) else {
            self.critical(
                subscription_id,
                Some(&configuration_id),
                "configuration not found",
            );
            return Err(DropReason::CriticalViolation);
        };

        if configuration.id != configuration_id {
            self.critical(
                subscription_id,
                Some(&configuration_id),
                "registry returned a different configuration",
            );
            return Err(DropReason::CriticalViolation);
        }

        if configuration.subscription_id.as_deref() != Some(subscription_id) {
            tracing::error!(
                subscription_id = %subscription_id,
                configuration_id = %configuration_id,
                bound_subscription = ?configuration.subscription_id,
                "CRITICAL: configuration is bound to a different subscription"
            );
            self.deps.diagnostics.record(DiagnosticEvent::CriticalViolation {
                subscription_id: subscription_id.to_string(),
                configuration_id: Some(configuration_id),
            });
            return Err(DropReason::CriticalViolation);
        }

        if !configuration.enabled {
            tracing::trace!(
                "Dropping event for disabled configuration {}",
                configuration.id
            );
            return Err(DropReason::ConfigurationDisabled);
        }

        Ok(configuration)
    }

    fn critical(&self, subscription_id: &str, configuration_id: Option<&str>, what: &str) {
        tracing::error!(
            subscription_id = %subscription_id,
            configuration_id = ?configuration_id,
            "CRITICAL: {}",
            what
        );
        self.deps.diagnostics.record(DiagnosticEvent::CriticalViolation {
            subscription_id: subscription_id.to_string(),
            configuration_id: configuration_id.map(str::to_string),
        });
    }

    fn validate(&self, payload: serde_json::Value, message: &QueuedMessage) -> Option<Event> {
        let checked = Event::from_value(payload).and_then(|event| {
            validate_event(&event)?;
            if self.config.verify_signatures {
                verify_signature(&event)?;
            }
            Ok(event)
        });

        match checked {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Invalid event from {}: {}", message.relay_url, e);
                self.deps.diagnostics.record(DiagnosticEvent::ParseError {
                    relay_url: message.relay_url.clone(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn record_unmatched(&self, subscription_id: &str) {
        let signal = self.unmatched.record_unmatched(subscription_id);
        if signal.newly_tripped {
            tracing::info!(
                "Subscription {} has {} consecutive unmatched events, flagging for cancellation",
                subscription_id,
                signal.count
            );
            self.deps
                .diagnostics
                .record(DiagnosticEvent::CancellationCandidate {
                    subscription_id: subscription_id.to_string(),
                    unmatched: signal.count,
                });
        }
    }

    fn dropped(&self, reason: DropReason) -> Outcome {
        if !reason.is_critical() {
            self.deps.diagnostics.record(DiagnosticEvent::Dropped {
                reason: reason.label(),
            });
        }
        Outcome::Dropped(reason)
    }

    fn duplicate(&self, stage: DuplicateStage, reason: DropReason) -> Outcome {
        self.deps
            .diagnostics
            .record(DiagnosticEvent::Duplicate { stage });
        Outcome::Dropped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        Harness, OTHER_SUBSCRIPTION, RELAY, SUBSCRIPTION, event_message, signed_event,
    };

    #[test]
    fn test_routes_valid_event() {
        let harness = Harness::new();
        let event = signed_event("gm nostr", vec![]);

        let outcome = harness.submit(&event_message(SUBSCRIPTION, &event));

        assert_eq!(
            outcome,
            Outcome::Routed {
                configuration_id: "cfg-1".to_string(),
                matched_keywords: vec![],
            }
        );
        let deliveries = harness.sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].event_id, event.id);
        assert_eq!(deliveries[0].subscription_id, SUBSCRIPTION);
        assert!(deliveries[0].uri.starts_with("https://app.example/open?id="));
    }

    #[test]
    fn test_duplicate_never_delivered_twice() {
        let harness = Harness::new();
        let event = signed_event("once", vec![]);
        let raw = event_message(SUBSCRIPTION, &event);

        assert!(harness.submit(&raw).is_routed());
        assert_eq!(
            harness.submit_from(&raw, "wss://other.example"),
            Outcome::Dropped(DropReason::Duplicate)
        );
        assert_eq!(harness.sink.count_for(&event.id), 1);
    }

    #[test]
    fn test_concurrent_duplicates_deliver_once() {
        let harness = Harness::new();
        let event = signed_event("race", vec![]);
        let raw = event_message(SUBSCRIPTION, &event);

        std::thread::scope(|s| {
            for i in 0..8 {
                let harness = &harness;
                let raw = &raw;
                s.spawn(move || harness.submit_from(raw, &format!("wss://relay{i}.example")));
            }
        });

        assert_eq!(harness.sink.count_for(&event.id), 1);
    }

    #[test]
    fn test_mismatched_binding_is_critical_and_not_delivered() {
        let harness = Harness::new();
        // Subscription bound to cfg-1, but cfg-1 points back at another one.
        harness.configurations.upsert({
            let mut config = harness.configuration();
            config.subscription_id = Some(OTHER_SUBSCRIPTION.to_string());
            config
        });
        let event = signed_event("leak?", vec![]);

        let outcome = harness.submit(&event_message(SUBSCRIPTION, &event));

        assert_eq!(outcome, Outcome::Dropped(DropReason::CriticalViolation));
        assert!(harness.sink.is_empty());
        assert!(harness.diagnostics_drained().iter().any(|d| matches!(
            d,
            DiagnosticEvent::CriticalViolation { subscription_id, .. } if subscription_id == SUBSCRIPTION
        )));
        // Nothing was marked, so the event can still route once fixed.
        assert!(!harness.dedupe.has_seen(&event.id));
    }

    #[test]
    fn test_missing_configuration_is_critical() {
        let harness = Harness::new();
        harness.configurations.remove("cfg-1");
        let event = signed_event("orphan", vec![]);

        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &event)),
            Outcome::Dropped(DropReason::CriticalViolation)
        );
    }

    #[test]
    fn test_inactive_and_disabled_are_silent_drops() {
        let harness = Harness::new();
        let event = signed_event("hello", vec![]);

        assert_eq!(
            harness.submit_on(&event_message("ghost", &event), "ghost"),
            Outcome::Dropped(DropReason::InactiveSubscription)
        );

        harness.configurations.upsert({
            let mut config = harness.configuration();
            config.enabled = false;
            config
        });
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &event)),
            Outcome::Dropped(DropReason::ConfigurationDisabled)
        );
        assert!(harness.sink.is_empty());
    }

    #[test]
    fn test_unparseable_and_invalid_events() {
        let harness = Harness::new();
        assert_eq!(
            harness.submit("not json"),
            Outcome::Dropped(DropReason::Unparseable)
        );

        let mut event = signed_event("hello", vec![]);
        event.content = "tampered".to_string();
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &event)),
            Outcome::Dropped(DropReason::InvalidEvent)
        );

        let parse_errors = harness
            .diagnostics_drained()
            .into_iter()
            .filter(|d| matches!(d, DiagnosticEvent::ParseError { .. }))
            .count();
        assert_eq!(parse_errors, 2);
    }

    #[test]
    fn test_signature_verification_when_enabled() {
        let harness = Harness::with_config(
            PipelineConfig {
                verify_signatures: true,
                ..Default::default()
            },
            |_| {},
        );
        let good = signed_event("signed", vec![]);
        assert!(harness.submit(&event_message(SUBSCRIPTION, &good)).is_routed());

        let mut forged = signed_event("forged", vec![]);
        forged.sig = "1".repeat(128);
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &forged)),
            Outcome::Dropped(DropReason::InvalidEvent)
        );
    }

    #[test]
    fn test_cursor_updated_only_after_mark() {
        let harness = Harness::new();
        let mut event = signed_event("first", vec![]);
        event.created_at = 1_700_000_500;
        let event = crate::test_support::resign(event);
        let raw = event_message(SUBSCRIPTION, &event);

        harness.submit(&raw);
        assert_eq!(
            harness.subscriptions.relay_timestamp(SUBSCRIPTION, RELAY),
            Some(1_700_000_500)
        );

        harness
            .subscriptions
            .set_relay_timestamp(SUBSCRIPTION, RELAY, 42);
        assert_eq!(harness.submit(&raw), Outcome::Dropped(DropReason::Duplicate));
        assert_eq!(harness.subscriptions.relay_timestamp(SUBSCRIPTION, RELAY), Some(42));
    }

    #[test]
    fn test_keyword_filter() {
        let harness = Harness::with_configuration(|config| {
            config.keywords = Some(vec!["bitcoin".to_string()]);
        });

        let hit = signed_event("I love bitcoin", vec![]);
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &hit)),
            Outcome::Routed {
                configuration_id: "cfg-1".to_string(),
                matched_keywords: vec!["bitcoin".to_string()],
            }
        );

        let miss = signed_event("hello world", vec![]);
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &miss)),
            Outcome::Dropped(DropReason::KeywordMismatch)
        );

        let empty = signed_event("", vec![]);
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &empty)),
            Outcome::Dropped(DropReason::KeywordMismatch)
        );
        assert_eq!(harness.sink.len(), 1);
    }

    #[test]
    fn test_exclusions() {
        let author = crate::test_support::author_pubkey();
        let harness = Harness::with_configuration(|config| {
            config.exclude_self_mentions = true;
            config.exclude_replies = true;
            config.filter.authors = vec![author.clone()];
        });

        let self_mention = signed_event("me", vec![vec!["p".to_string(), author.clone()]]);
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &self_mention)),
            Outcome::Dropped(DropReason::SelfMention)
        );

        let reply = signed_event("re", vec![vec!["e".to_string(), "ab".repeat(32)]]);
        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &reply)),
            Outcome::Dropped(DropReason::Reply)
        );

        // Exclusions don't count toward the unmatched streak.
        assert_eq!(harness.pipeline.unmatched().count(SUBSCRIPTION), 0);
    }

    #[test]
    fn test_oversized_event_delivered_by_reference() {
        let harness = Harness::with_configuration(|config| {
            config.relay_urls = [RELAY.to_string()].into_iter().collect();
        });
        let big = signed_event(&"x".repeat(MAX_INLINE_EVENT_BYTES + 10), vec![]);
        let small = signed_event("small", vec![]);

        assert!(harness.submit(&event_message(SUBSCRIPTION, &big)).is_routed());
        assert!(harness.submit(&event_message(SUBSCRIPTION, &small)).is_routed());

        let deliveries = harness.sink.deliveries();
        assert!(!deliveries[0].uri.contains("event="));
        assert!(deliveries[0].uri.contains("relay=wss%3A%2F%2Frelay.example"));
        assert!(deliveries[1].uri.contains("event="));
    }

    #[test]
    fn test_bad_target_drops_with_error() {
        let harness = Harness::with_configuration(|config| {
            config.target_uri = "not a uri".to_string();
        });
        let event = signed_event("hello", vec![]);

        assert_eq!(
            harness.submit(&event_message(SUBSCRIPTION, &event)),
            Outcome::Dropped(DropReason::DeliveryBuildFailed)
        );
        assert!(harness.sink.is_empty());
        assert_eq!(harness.pipeline.unmatched().count(SUBSCRIPTION), 1);
    }

    #[test]
    fn test_unmatched_streak_trips_and_resets() {
        let harness = Harness::with_configuration(|config| {
            config.keywords = Some(vec!["bitcoin".to_string()]);
        });

        for i in 0..4 {
            let miss = signed_event(&format!("nothing here {i}"), vec![]);
            harness.submit(&event_message(SUBSCRIPTION, &miss));
        }
        let hit = signed_event("bitcoin!", vec![]);
        assert!(harness.submit(&event_message(SUBSCRIPTION, &hit)).is_routed());
        assert_eq!(harness.pipeline.unmatched().count(SUBSCRIPTION), 0);

        for i in 0..5 {
            let miss = signed_event(&format!("still nothing {i}"), vec![]);
            harness.submit(&event_message(SUBSCRIPTION, &miss));
        }
        assert_eq!(harness.pipeline.unmatched().count(SUBSCRIPTION), 5);
        assert!(harness.pipeline.unmatched().is_cancellation_candidate(SUBSCRIPTION));

        let flagged = harness
            .diagnostics_drained()
            .into_iter()
            .filter(|d| matches!(d, DiagnosticEvent::CancellationCandidate { .. }))
            .count();
        assert_eq!(flagged, 1);
    }

    #[test]
    fn test_control_messages() {
        let harness = Harness::new();

        assert_eq!(
            harness.submit(&format!(r#"["EOSE","{SUBSCRIPTION}"]"#)),
            Outcome::Control
        );
        assert!(harness.subscriptions.is_caught_up(SUBSCRIPTION));

        assert_eq!(harness.submit(r#"["NOTICE","slow down"]"#), Outcome::Control);
        assert_eq!(
            harness.submit(&format!(r#"["OK","{}",false,"blocked"]"#, "ab".repeat(32))),
            Outcome::Control
        );
        assert_eq!(harness.submit(r#"["AUTH","challenge"]"#), Outcome::Control);
        assert!(harness.sink.is_empty());
    }

    #[test]
    fn test_delivering_subscription_is_authoritative() {
        let harness = Harness::new();
        let event = signed_event("hello", vec![]);

        // Payload names another subscription; the connection's id wins.
        let outcome = harness.submit(&event_message(OTHER_SUBSCRIPTION, &event));
        assert!(outcome.is_routed());
        assert_eq!(harness.sink.deliveries()[0].subscription_id, SUBSCRIPTION);
    }
}

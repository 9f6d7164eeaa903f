//! User routing rules.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Relay query filter attached to a configuration.
///
/// Relays apply it when answering the subscription; locally only `authors`
/// is consulted (by the reply exclusion filter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Event kinds to request.
    #[serde(default)]
    pub kinds: Vec<u32>,
    /// Author public keys (hex) to request.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Tag filters, keyed by single-letter tag name.
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl EventFilter {
    /// True if `pubkey` is one of the filter's authors.
    pub fn has_author(&self, pubkey: &str) -> bool {
        self.authors.iter().any(|a| a.eq_ignore_ascii_case(pubkey))
    }
}

/// A user-defined routing rule.
///
/// Owned by the configuration registry; the pipeline only reads snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Unique id.
    pub id: String,
    /// Disabled configurations never route.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Human-readable name.
    pub name: String,
    /// Endpoint deliveries are addressed to, e.g. `https://app.example/open`.
    pub target_uri: String,
    /// Relays the subscription runs on.
    #[serde(default)]
    pub relay_urls: BTreeSet<String>,
    /// Relay query filter.
    #[serde(default)]
    pub filter: EventFilter,
    /// Optional keyword filter; `None` or empty routes everything.
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    /// Drop events whose author tags themselves.
    #[serde(default)]
    pub exclude_self_mentions: bool,
    /// Drop events from filtered authors that reference another event.
    #[serde(default)]
    pub exclude_replies: bool,
    /// Subscription currently bound to this configuration.
    #[serde(default)]
    pub subscription_id: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Configuration {
    /// Enabled configuration with no filters and no bound subscription.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        target_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            name: name.into(),
            target_uri: target_uri.into(),
            relay_urls: BTreeSet::new(),
            filter: EventFilter::default(),
            keywords: None,
            exclude_self_mentions: false,
            exclude_replies: false,
            subscription_id: None,
        }
    }

    /// Configured keywords with blanks removed.
    pub fn keyword_list(&self) -> Vec<&str> {
        self.keywords
            .iter()
            .flatten()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// True if a keyword filter applies.
    pub fn has_keyword_filter(&self) -> bool {
        !self.keyword_list().is_empty()
    }
}

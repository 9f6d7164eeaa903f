//! Local exclusion filters, applied after dedupe and before keywords.

use super::DropReason;
use crate::registry::Configuration;
use herald_core::Event;

/// Check the configuration's exclusion flags, cheapest first.
///
/// Returns the reason the event should be dropped, if any.
pub fn check(event: &Event, configuration: &Configuration) -> Option<DropReason> {
    if configuration.exclude_self_mentions && is_self_mention(event) {
        return Some(DropReason::SelfMention);
    }
    if configuration.exclude_replies && is_reply_from_filtered_author(event, configuration) {
        return Some(DropReason::Reply);
    }
    None
}

/// The author tags themselves with a `p` tag.
pub fn is_self_mention(event: &Event) -> bool {
    event.mentions(&event.pubkey)
}

/// The author is in the configuration's author filter and the event
/// references another event.
pub fn is_reply_from_filtered_author(event: &Event, configuration: &Configuration) -> bool {
    configuration.filter.has_author(&event.pubkey) && event.has_event_reference()
}

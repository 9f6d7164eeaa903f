//! Delivery URI construction.
//!
//! The configuration's target endpoint gets `id=<event id>` appended, then
//! either the whole event or, when it is too big, the relays it can be
//! fetched from:
//!
//! ```text
//! https://app.example/open?id=<id>&event=<base64url(json)>
//! https://app.example/open?id=<id>&relay=wss%3A%2F%2Fa&relay=wss%3A%2F%2Fb
//! ```
//!
//! The event is encoded as base64url without padding.

use crate::error::{Error, Result};
use crate::registry::Configuration;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use herald_core::Event;
use url::Url;

/// How the event travels in the URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Full event body inline.
    Inline,
    /// Id plus relay hints only.
    Reference,
}

/// Built delivery URI.
#[derive(Debug, Clone)]
pub struct DeliveryUri {
    pub uri: Url,
    pub payload: Payload,
}

/// Build the delivery URI for `event`.
///
/// Events whose serialized JSON is larger than `max_inline_bytes` are sent
/// by reference. A target endpoint that doesn't parse, or can't carry a
/// query, is an [`Error::Delivery`].
pub fn build_delivery_uri(
    event: &Event,
    configuration: &Configuration,
    max_inline_bytes: usize,
) -> Result<DeliveryUri> {
    let mut uri = Url::parse(configuration.target_uri.trim()).map_err(|e| Error::Delivery {
        configuration_id: configuration.id.clone(),
        reason: format!("invalid target URI {:?}: {}", configuration.target_uri, e),
    })?;
    if uri.cannot_be_a_base() {
        return Err(Error::Delivery {
            configuration_id: configuration.id.clone(),
            reason: format!("target URI {:?} cannot carry a query", configuration.target_uri),
        });
    }

    let json = event.to_json()?;
    let payload = if json.len() > max_inline_bytes {
        Payload::Reference
    } else {
        Payload::Inline
    };

    {
        let mut query = uri.query_pairs_mut();
        query.append_pair("id", &event.id);
        match payload {
            Payload::Inline => {
                query.append_pair("event", &URL_SAFE_NO_PAD.encode(json.as_bytes()));
            }
            Payload::Reference => {
                for relay in &configuration.relay_urls {
                    query.append_pair("relay", relay);
                }
            }
        }
    }

    Ok(DeliveryUri { uri, payload })
}

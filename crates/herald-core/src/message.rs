//! Relay-to-client message parsing.
//!
//! Relays speak JSON arrays whose first element names the message type:
//!
//! ```text
//! ["EVENT", <subscription id>, <event object>]
//! ["EOSE", <subscription id>]
//! ["NOTICE", <message>]
//! ["OK", <event id>, <true|false>, <message>]
//! ```
//!
//! Anything else with a string tag decodes to [`RelayMessage::Unknown`].
//! The event payload is kept as raw JSON so that envelope parsing and event
//! validation stay separate steps.

use crate::error::{Error, Result};
use serde_json::Value;

/// A decoded relay message.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// An event delivered for a subscription.
    Event {
        subscription_id: String,
        event: Value,
    },
    /// End of stored events: historical replay for the subscription is done.
    Eose { subscription_id: String },
    /// Human-readable notice from the relay.
    Notice { message: String },
    /// Acknowledgement of a previously published event.
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// A message type this client does not handle.
    Unknown { kind: String },
}

impl RelayMessage {
    /// Parse a raw relay message.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Parse a relay message from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(mut items) = value else {
            return Err(Error::InvalidMessage("expected a JSON array".to_string()));
        };

        let kind = match items.first() {
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(Error::InvalidMessage(
                    "message type must be a string".to_string(),
                ));
            }
            None => return Err(Error::InvalidMessage("empty message".to_string())),
        };

        match kind.as_str() {
            "EVENT" => {
                if items.len() < 3 {
                    return Err(Error::InvalidMessage(format!(
                        "EVENT expects 3 elements, got {}",
                        items.len()
                    )));
                }
                let subscription_id = string_at(&items, 1, "EVENT")?;
                let event = items.swap_remove(2);
                if !event.is_object() {
                    return Err(Error::InvalidMessage(
                        "EVENT payload must be an object".to_string(),
                    ));
                }
                Ok(Self::Event {
                    subscription_id,
                    event,
                })
            }
            "EOSE" => Ok(Self::Eose {
                subscription_id: string_at(&items, 1, "EOSE")?,
            }),
            "NOTICE" => Ok(Self::Notice {
                message: string_at(&items, 1, "NOTICE")?,
            }),
            "OK" => {
                let event_id = string_at(&items, 1, "OK")?;
                let accepted = items.get(2).and_then(Value::as_bool).ok_or_else(|| {
                    Error::InvalidMessage("OK expects a boolean at position 2".to_string())
                })?;
                let message = items
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            _ => Ok(Self::Unknown { kind }),
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Event { .. } => "EVENT",
            Self::Eose { .. } => "EOSE",
            Self::Notice { .. } => "NOTICE",
            Self::Ok { .. } => "OK",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }
}

fn string_at(items: &[Value], index: usize, kind: &str) -> Result<String> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidMessage(format!("{kind} expects a string at position {index}")))
}

//! Poloniex Push API Message Types
//!
//! Wire format types for the order book channels of the Poloniex push API.
//!
//! # Message Types
//!
//! ## Outbound
//! - `SubscribeCommand`: one per channel, sent as a text frame
//!
//! ## Inbound
//! - Data frames: `[<channel id>, <sequence>, [[<tag>, ...fields], ...]]`
//! - Heartbeat: `[1010]`
//! - Error: `{"error": "<message>"}`
//!
//! Data frames are positional arrays and are decoded by
//! [`FrameCodec`](super::codec::FrameCodec); only the nested snapshot object
//! has a named-field shape and lives here.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use super::coerce;
use crate::domain::records::ChannelId;

/// Channel id the server uses for heartbeat frames.
pub const HEARTBEAT_CHANNEL: ChannelId = 1010;

/// Default push API endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://api2.poloniex.com";

// =============================================================================
// Outbound
// =============================================================================

/// Subscription action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionCommand {
    /// Start streaming a channel.
    Subscribe,
}

/// Subscribe request for a single channel.
///
/// # Wire Format (JSON)
/// ```json
/// {"command": "subscribe", "channel": "USDT_BTC"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeCommand {
    /// Action to perform.
    pub command: SubscriptionCommand,
    /// Channel name (`QUOTE_BASE`).
    pub channel: String,
}

impl SubscribeCommand {
    /// Build a subscribe request for a channel.
    #[must_use]
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            command: SubscriptionCommand::Subscribe,
            channel: channel.into(),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Error object sent by the server, e.g. for an unknown channel.
///
/// # Wire Format (JSON)
/// ```json
/// {"error": "Invalid channel."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerErrorMessage {
    /// Error description.
    pub error: String,
}

/// Snapshot object nested in an `i` record.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "currencyPair": "USDT_BTC",
///   "orderBook": [
///     {"8190.00000000": "0.10000000", "8190.50000000": "1.25000000"},
///     {"8189.99000000": "0.50000000"}
///   ]
/// }
/// ```
///
/// The first map holds asks, the second bids, each keyed by price.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotPayload {
    /// Channel name the book belongs to.
    #[serde(rename = "currencyPair")]
    pub currency_pair: String,

    /// `[asks, bids]`.
    #[serde(rename = "orderBook")]
    pub order_book: Vec<LevelMap>,
}

/// Price → size map that keeps the order levels appear in on the wire.
///
/// Values are kept as unquoted text so sizes never pass through a float.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelMap(pub Vec<(String, String)>);

impl LevelMap {
    /// Levels in wire order.
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for LevelMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LevelMapVisitor;

        impl<'de> Visitor<'de> for LevelMapVisitor {
            type Value = LevelMap;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of price to size")
            }

            fn visit_map<V>(self, mut map: V) -> Result<LevelMap, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut levels = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((price, size)) = map.next_entry::<String, Box<RawValue>>()? {
                    levels.push((price, coerce::unquote(size.get()).to_string()));
                }
                Ok(LevelMap(levels))
            }
        }

        deserializer.deserialize_map(LevelMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_wire_format() {
        let json = SubscribeCommand::subscribe("USDT_BTC").to_json().unwrap();
        assert_eq!(json, r#"{"command":"subscribe","channel":"USDT_BTC"}"#);
    }

    #[test]
    fn only_subscribe_is_a_command() {
        let unsubscribe = r#"{"command":"unsubscribe","channel":"USDT_BTC"}"#;
        assert!(serde_json::from_str::<SubscribeCommand>(unsubscribe).is_err());
    }

    #[test]
    fn snapshot_payload_keeps_wire_order() {
        let json = r#"{
            "currencyPair": "USDT_BTC",
            "orderBook": [
                {"8190.5": "1.25", "8190.0": "0.1", "8191": "3"},
                {"8189.99": "0.5", "8189.5": 2}
            ]
        }"#;

        let payload: SnapshotPayload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.currency_pair, "USDT_BTC");
        assert_eq!(payload.order_book.len(), 2);
        let prices: Vec<_> = payload.order_book[0]
            .entries()
            .iter()
            .map(|(price, _)| price.as_str())
            .collect();
        assert_eq!(prices, vec!["8190.5", "8190.0", "8191"]);
        assert_eq!(
            payload.order_book[1].entries()[1],
            ("8189.5".to_string(), "2".to_string())
        );
    }

    #[test]
    fn server_error_parses() {
        let msg: ServerErrorMessage =
            serde_json::from_str(r#"{"error": "Invalid channel."}"#).unwrap();
        assert_eq!(msg.error, "Invalid channel.");
    }
}

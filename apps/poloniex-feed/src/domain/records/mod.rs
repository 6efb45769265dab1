//! Order Book Record Types
//!
//! Canonical, codec-agnostic representation of what the feed delivers:
//! sequenced batches of snapshot, order delta and trade records.
//! Prices and sizes are [`Decimal`] end to end.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wire channel identifier assigned by the feed.
pub type ChannelId = u64;

/// Per-channel sequence number.
pub type Sequence = i64;

/// Side of an order book level update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookSide {
    /// Bid (wire flag `1`).
    Bid,
    /// Ask (wire flag `0`).
    Ask,
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    /// Buy (wire flag `1`).
    Buy,
    /// Sell (wire flag `0`).
    Sell,
}

/// One price level of an order book snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Total size resting at the price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a level.
    #[must_use]
    pub const fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Full order book snapshot (tag `i`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Channel name the snapshot belongs to (`QUOTE_BASE`).
    pub currency_pair: String,
    /// Ask levels, in wire order.
    pub asks: Vec<PriceLevel>,
    /// Bid levels, in wire order.
    pub bids: Vec<PriceLevel>,
    /// Exchange event time, epoch milliseconds.
    pub event_time_ms: i64,
}

/// Incremental order book change (tag `o`). A zero size removes the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelta {
    /// Book side touched by the update.
    pub side: BookSide,
    /// Level price.
    pub price: Decimal,
    /// New size at the level.
    pub size: Decimal,
    /// Exchange event time, epoch milliseconds.
    pub event_time_ms: i64,
}

/// Public trade print (tag `t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange trade id.
    pub trade_id: i64,
    /// Aggressor side.
    pub side: TradeSide,
    /// Execution price.
    pub price: Decimal,
    /// Executed size.
    pub size: Decimal,
    /// Time of the transaction.
    pub transaction_time: DateTime<Utc>,
    /// Exchange event time, epoch milliseconds.
    pub event_time_ms: i64,
}

/// A decoded record, classified by its leading wire tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// Tag `i`.
    Snapshot(Snapshot),
    /// Tag `o`.
    OrderDelta(OrderDelta),
    /// Tag `t`.
    Trade(Trade),
    /// Any tag this client does not understand.
    Unknown {
        /// The tag as received.
        raw_tag: String,
    },
}

impl Record {
    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::OrderDelta(_) => "order_delta",
            Self::Trade(_) => "trade",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// The snapshot payload, if this is a snapshot.
    #[must_use]
    pub const fn as_snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// One inbound frame: a batch of records on a single channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedMessage {
    /// Channel the frame arrived on.
    pub channel_id: ChannelId,
    /// Sequence number of the frame on its channel.
    pub sequence: Sequence,
    /// Successfully decoded records, in wire order.
    pub records: Vec<Record>,
}

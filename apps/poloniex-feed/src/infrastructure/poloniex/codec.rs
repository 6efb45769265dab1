//! Frame Codec
//!
//! Decodes Poloniex push API text frames into [`SequencedMessage`]s.
//!
//! # Frame Format
//!
//! ```json
//! [121, 8403634, [
//!   ["i", {"currencyPair": "USDT_BTC", "orderBook": [{...}, {...}]}, "1580000000000"],
//!   ["o", 1, "8190.00000000", "0.10000000", "1580000000001"],
//!   ["t", "42206331", 0, "8191.00000000", "0.05000000", 1580000001, "1580000001002"]
//! ]]
//! ```
//!
//! Records are classified by their leading tag and checked against a fixed
//! arity table (number of fields after the tag):
//!
//! | tag | arity | fields |
//! |-----|-------|--------|
//! | `i` | 2 | snapshot object, epoch ms |
//! | `o` | 4 | side (1=bid), price, size, epoch ms |
//! | `t` | 6 | trade id, side (1=buy), price, size, unix seconds, epoch ms |
//!
//! A bad record is reported and skipped; its siblings still decode. A frame
//! whose outer shape is wrong fails as a whole.

use serde_json::value::RawValue;

use super::coerce;
use super::messages::{HEARTBEAT_CHANNEL, LevelMap, ServerErrorMessage, SnapshotPayload};
use crate::domain::records::{
    BookSide, ChannelId, OrderDelta, PriceLevel, Record, Sequence, SequencedMessage, Snapshot,
    Trade, TradeSide,
};

/// Longest raw excerpt kept in a shape error.
const EXCERPT_LEN: usize = 64;

// =============================================================================
// Errors
// =============================================================================

/// Decode failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not `[channel, sequence, [records...]]` or a record has
    /// no string tag.
    #[error("frame shape error: {0}")]
    FrameShape(String),

    /// A record array has the wrong length for its tag.
    #[error("record {tag:?} expects {expected} fields, got array of length {got_len}")]
    RecordArity {
        /// Record tag.
        tag: String,
        /// Fields expected after the tag.
        expected: usize,
        /// Length of the record array, tag included.
        got_len: usize,
    },

    /// A field could not be converted to its typed value.
    #[error("malformed field {field}: {raw_value:?}")]
    MalformedField {
        /// Field name.
        field: &'static str,
        /// Raw token as received.
        raw_value: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(field: &'static str, raw_value: &str) -> Self {
        Self::MalformedField {
            field,
            raw_value: raw_value.to_string(),
        }
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FrameShape(_) => "frame_shape",
            Self::RecordArity { .. } => "record_arity",
            Self::MalformedField { .. } => "malformed_field",
        }
    }
}

/// A record that failed to decode, by position in its frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// Index of the record within the frame's batch.
    pub index: usize,
    /// Why it failed.
    pub error: DecodeError,
}

/// Outcome of decoding one data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Channel, sequence and every record that decoded.
    pub message: SequencedMessage,
    /// Records that were skipped.
    pub errors: Vec<RecordError>,
}

/// Classification of an inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Server keepalive, `[1010]`.
    Heartbeat,
    /// Server error object.
    ServerError(String),
    /// Data frame, decoded or not.
    Data(Result<DecodedFrame, DecodeError>),
}

// =============================================================================
// Record Tags
// =============================================================================

/// Record tags with a known layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordTag {
    Snapshot,
    OrderDelta,
    Trade,
}

impl RecordTag {
    fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "i" => Some(Self::Snapshot),
            "o" => Some(Self::OrderDelta),
            "t" => Some(Self::Trade),
            _ => None,
        }
    }

    /// Number of fields after the tag.
    const fn arity(self) -> usize {
        match self {
            Self::Snapshot => 2,
            Self::OrderDelta => 4,
            Self::Trade => 6,
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Decoder for Poloniex order book frames. Stateless.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify a text frame and decode it if it carries data.
    #[must_use]
    pub fn read(&self, text: &str) -> Inbound {
        let trimmed = text.trim();

        if trimmed.starts_with('{')
            && let Ok(error) = serde_json::from_str::<ServerErrorMessage>(trimmed)
        {
            return Inbound::ServerError(error.error);
        }

        if let Ok([channel]) = serde_json::from_str::<[ChannelId; 1]>(trimmed)
            && channel == HEARTBEAT_CHANNEL
        {
            return Inbound::Heartbeat;
        }

        Inbound::Data(self.decode(trimmed))
    }

    /// Decode a data frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FrameShape`] if the outer array is not exactly
    /// `[channel, sequence, records]`, or if any record lacks a string tag.
    /// Per-record failures are returned in [`DecodedFrame::errors`] instead.
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, DecodeError> {
        let top: Vec<&RawValue> = serde_json::from_str(text)
            .map_err(|e| DecodeError::FrameShape(format!("expected a JSON array: {e}")))?;

        let [channel, sequence, batch] = top.as_slice() else {
            return Err(DecodeError::FrameShape(format!(
                "expected 3 elements, got {}",
                top.len()
            )));
        };

        let channel_id: ChannelId = serde_json::from_str(channel.get()).map_err(|_| {
            DecodeError::FrameShape(format!("channel id is not an integer: {}", excerpt(channel)))
        })?;

        let sequence: Sequence = serde_json::from_str(sequence.get()).map_err(|_| {
            DecodeError::FrameShape(format!("sequence is not an integer: {}", excerpt(sequence)))
        })?;

        let raw_records: Vec<Vec<&RawValue>> = serde_json::from_str(batch.get()).map_err(|e| {
            DecodeError::FrameShape(format!("expected an array of record arrays: {e}"))
        })?;

        let tags = raw_records
            .iter()
            .enumerate()
            .map(|(index, fields)| record_tag(index, fields))
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(raw_records.len());
        let mut errors = Vec::new();

        for (index, (tag, fields)) in tags.into_iter().zip(&raw_records).enumerate() {
            match decode_record(tag, fields) {
                Ok(record) => records.push(record),
                Err(error) => errors.push(RecordError { index, error }),
            }
        }

        Ok(DecodedFrame {
            message: SequencedMessage {
                channel_id,
                sequence,
                records,
            },
            errors,
        })
    }
}

fn record_tag(index: usize, fields: &[&RawValue]) -> Result<String, DecodeError> {
    let Some(first) = fields.first() else {
        return Err(DecodeError::FrameShape(format!("record {index} is empty")));
    };

    serde_json::from_str::<String>(first.get()).map_err(|_| {
        DecodeError::FrameShape(format!(
            "record {index} tag is not a string: {}",
            excerpt(first)
        ))
    })
}

fn decode_record(tag: String, fields: &[&RawValue]) -> Result<Record, DecodeError> {
    let Some(kind) = RecordTag::from_wire(&tag) else {
        tracing::warn!(tag = %tag, "Unknown record tag");
        return Ok(Record::Unknown { raw_tag: tag });
    };

    let values = &fields[1..];
    if values.len() != kind.arity() {
        return Err(DecodeError::RecordArity {
            tag,
            expected: kind.arity(),
            got_len: fields.len(),
        });
    }

    match kind {
        RecordTag::Snapshot => decode_snapshot(values).map(Record::Snapshot),
        RecordTag::OrderDelta => decode_order_delta(values).map(Record::OrderDelta),
        RecordTag::Trade => decode_trade(values).map(Record::Trade),
    }
}

fn decode_snapshot(values: &[&RawValue]) -> Result<Snapshot, DecodeError> {
    let payload: SnapshotPayload = serde_json::from_str(values[0].get())
        .map_err(|_| DecodeError::malformed("snapshot", excerpt(values[0])))?;

    let [asks, bids] = payload.order_book.as_slice() else {
        return Err(DecodeError::malformed(
            "orderBook",
            &format!("{} sides", payload.order_book.len()),
        ));
    };

    Ok(Snapshot {
        asks: decode_levels(asks, "askPrice", "askSize")?,
        bids: decode_levels(bids, "bidPrice", "bidSize")?,
        event_time_ms: coerce::parse_i64("eventTimeMs", values[1].get())?,
        currency_pair: payload.currency_pair,
    })
}

fn decode_levels(
    levels: &LevelMap,
    price_field: &'static str,
    size_field: &'static str,
) -> Result<Vec<PriceLevel>, DecodeError> {
    levels
        .entries()
        .iter()
        .map(|(price, size)| {
            Ok(PriceLevel::new(
                coerce::parse_decimal(price_field, price)?,
                coerce::parse_decimal(size_field, size)?,
            ))
        })
        .collect()
}

fn decode_order_delta(values: &[&RawValue]) -> Result<OrderDelta, DecodeError> {
    let side = match coerce::parse_i64("side", values[0].get())? {
        1 => BookSide::Bid,
        0 => BookSide::Ask,
        _ => return Err(DecodeError::malformed("side", values[0].get())),
    };

    Ok(OrderDelta {
        side,
        price: coerce::parse_decimal("price", values[1].get())?,
        size: coerce::parse_decimal("size", values[2].get())?,
        event_time_ms: coerce::parse_i64("eventTimeMs", values[3].get())?,
    })
}

fn decode_trade(values: &[&RawValue]) -> Result<Trade, DecodeError> {
    let side = match coerce::parse_i64("side", values[1].get())? {
        1 => TradeSide::Buy,
        0 => TradeSide::Sell,
        _ => return Err(DecodeError::malformed("side", values[1].get())),
    };

    Ok(Trade {
        trade_id: coerce::parse_int_lenient(values[0].get()),
        side,
        price: coerce::parse_decimal("price", values[2].get())?,
        size: coerce::parse_decimal("size", values[3].get())?,
        transaction_time: coerce::parse_unix_seconds("transactionTime", values[4].get())?,
        event_time_ms: coerce::parse_i64("eventTimeMs", values[5].get())?,
    })
}

fn excerpt(raw: &RawValue) -> &str {
    let text = raw.get();
    let end = text
        .char_indices()
        .nth(EXCERPT_LEN)
        .map_or(text.len(), |(idx, _)| idx);
    &text[..end]
}

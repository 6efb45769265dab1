//! Channel Routing
//!
//! Maps wire channel ids to configured instruments and decides where each
//! decoded record goes.
//!
//! # Design
//!
//! The feed never echoes the channel id in response to a subscribe request.
//! The id is learned from the first snapshot on the channel, whose
//! `currencyPair` names the subscribed channel. Until then, records on the
//! channel are held in a bounded per-channel buffer and released to the right
//! instrument once the snapshot arrives.
//!
//! Held records are also bounded in total: at most `pending_limit` per
//! registered instrument across all unlearned channels, since only that many
//! channels can ever be learned. A flood of unknown channel ids overflows to
//! the unmapped sink instead of growing the hold buffers.
//!
//! Nothing is dropped: records on channels that cannot be attributed go out
//! as [`Delivery::Unmapped`].

use std::collections::{HashMap, HashSet, VecDeque};

use super::instrument::Instrument;
use super::records::{ChannelId, Record, Sequence, SequencedMessage};
use super::sequence::{SequenceRegression, SequenceTracker};

// =============================================================================
// Types
// =============================================================================

/// Why a record could not be attributed to an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmappedReason {
    /// The channel carried a snapshot for a pair that was never subscribed.
    UnknownPair(String),
    /// The hold buffer for the channel, or for all unlearned channels
    /// together, was full.
    PendingOverflow,
    /// The session ended before the channel was learned.
    NeverLearned,
}

/// Destination of a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Record attributed to a configured instrument.
    Routed {
        /// Originating instrument.
        instrument: Instrument,
        /// Channel the record arrived on.
        channel_id: ChannelId,
        /// Sequence number of the carrying frame.
        sequence: Sequence,
        /// The record.
        record: Record,
    },
    /// Record on a channel without a known instrument.
    Unmapped {
        /// Channel the record arrived on.
        channel_id: ChannelId,
        /// Sequence number of the carrying frame.
        sequence: Sequence,
        /// The record.
        record: Record,
        /// Why it could not be routed.
        reason: UnmappedReason,
    },
}

/// Result of routing one frame.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Records ready for the consumer, in delivery order.
    pub deliveries: Vec<Delivery>,
    /// Channel mapping learned while routing this frame.
    pub learned: Option<(ChannelId, Instrument)>,
    /// Sequence regression detected on this frame.
    pub regression: Option<SequenceRegression>,
}

#[derive(Debug)]
struct HeldRecord {
    sequence: Sequence,
    record: Record,
}

// =============================================================================
// Channel Router
// =============================================================================

/// Owns the channel id → instrument map for one connection.
///
/// Not shared: the session's read loop is the only owner.
///
/// Memory is bounded by the hold limits for unlearned channels. Learned and
/// foreign channels cost one map entry per id the server announced with a
/// snapshot, which is at most one per channel the server opens.
#[derive(Debug)]
pub struct ChannelRouter {
    /// Registered instruments.
    subscribed: HashSet<Instrument>,
    /// Learned channel id → instrument.
    channels: HashMap<ChannelId, Instrument>,
    /// Channel ids whose snapshot named an unsubscribed pair.
    foreign: HashMap<ChannelId, String>,
    /// Records waiting for their channel to be learned.
    pending: HashMap<ChannelId, VecDeque<HeldRecord>>,
    /// Max records held per unlearned channel. The total across channels is
    /// capped at this times the number of registered instruments.
    pending_limit: usize,
    /// Records currently held across all channels.
    held: usize,
    sequences: SequenceTracker,
}

impl ChannelRouter {
    /// Create a router that holds at most `pending_limit` records per
    /// unlearned channel.
    #[must_use]
    pub fn new(pending_limit: usize) -> Self {
        Self {
            subscribed: HashSet::new(),
            channels: HashMap::new(),
            foreign: HashMap::new(),
            pending: HashMap::new(),
            pending_limit,
            held: 0,
            sequences: SequenceTracker::new(),
        }
    }

    /// Register a subscribed instrument so its channel can be learned.
    pub fn register(&mut self, instrument: Instrument) {
        self.subscribed.insert(instrument);
    }

    /// Whether an instrument is already registered.
    #[must_use]
    pub fn is_registered(&self, instrument: &Instrument) -> bool {
        self.subscribed.contains(instrument)
    }

    /// Number of registered instruments.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.subscribed.len()
    }

    /// Instrument learned for a channel id.
    #[must_use]
    pub fn instrument_for(&self, channel_id: ChannelId) -> Option<&Instrument> {
        self.channels.get(&channel_id)
    }

    /// All learned channel mappings, ordered by channel id.
    #[must_use]
    pub fn learned_channels(&self) -> Vec<(ChannelId, Instrument)> {
        let mut learned: Vec<_> = self
            .channels
            .iter()
            .map(|(id, instrument)| (*id, instrument.clone()))
            .collect();
        learned.sort_by_key(|(id, _)| *id);
        learned
    }

    /// Number of records currently held for unlearned channels.
    #[must_use]
    pub const fn pending_count(&self) -> usize {
        self.held
    }

    /// Route one decoded frame.
    pub fn dispatch(&mut self, message: SequencedMessage) -> Dispatch {
        let SequencedMessage {
            channel_id,
            sequence,
            records,
        } = message;

        let mut dispatch = Dispatch {
            regression: self.sequences.observe(channel_id, sequence),
            ..Dispatch::default()
        };

        if let Some(pair) = self.foreign.get(&channel_id) {
            let reason = UnmappedReason::UnknownPair(pair.clone());
            dispatch.deliveries.extend(records.into_iter().map(|record| Delivery::Unmapped {
                channel_id,
                sequence,
                record,
                reason: reason.clone(),
            }));
            return dispatch;
        }

        if !self.channels.contains_key(&channel_id) {
            let announced = records
                .iter()
                .find_map(Record::as_snapshot)
                .map(|snapshot| snapshot.currency_pair.clone());

            match announced {
                Some(pair) => match self.subscribed_instrument(&pair) {
                    Some(instrument) => {
                        self.channels.insert(channel_id, instrument.clone());
                        dispatch.learned = Some((channel_id, instrument.clone()));
                        self.release_pending(channel_id, &instrument, &mut dispatch.deliveries);
                    }
                    None => {
                        self.reject_channel(channel_id, pair, records, sequence, &mut dispatch);
                        return dispatch;
                    }
                },
                None => {
                    self.hold(channel_id, sequence, records, &mut dispatch.deliveries);
                    return dispatch;
                }
            }
        }

        if let Some(instrument) = self.channels.get(&channel_id) {
            dispatch.deliveries.extend(records.into_iter().map(|record| Delivery::Routed {
                instrument: instrument.clone(),
                channel_id,
                sequence,
                record,
            }));
        }

        dispatch
    }

    /// Release every held record as unmapped. Called when the session ends.
    pub fn drain(&mut self) -> Vec<Delivery> {
        self.held = 0;
        let mut channels: Vec<_> = self.pending.drain().collect();
        channels.sort_by_key(|(id, _)| *id);

        channels
            .into_iter()
            .flat_map(|(channel_id, held)| {
                held.into_iter().map(move |held| Delivery::Unmapped {
                    channel_id,
                    sequence: held.sequence,
                    record: held.record,
                    reason: UnmappedReason::NeverLearned,
                })
            })
            .collect()
    }

    /// The registered instrument a snapshot's `currencyPair` names, if any.
    fn subscribed_instrument(&self, pair: &str) -> Option<Instrument> {
        Instrument::from_channel(pair)
            .ok()
            .filter(|instrument| self.subscribed.contains(instrument))
    }

    fn total_hold_limit(&self) -> usize {
        self.pending_limit
            .saturating_mul(self.subscribed.len().max(1))
    }

    fn hold(
        &mut self,
        channel_id: ChannelId,
        sequence: Sequence,
        records: Vec<Record>,
        deliveries: &mut Vec<Delivery>,
    ) {
        let total_limit = self.total_hold_limit();
        let queue = self.pending.entry(channel_id).or_default();

        for record in records {
            if queue.len() < self.pending_limit && self.held < total_limit {
                queue.push_back(HeldRecord { sequence, record });
                self.held += 1;
            } else {
                deliveries.push(Delivery::Unmapped {
                    channel_id,
                    sequence,
                    record,
                    reason: UnmappedReason::PendingOverflow,
                });
            }
        }

        if queue.is_empty() {
            self.pending.remove(&channel_id);
        }
    }

    fn release_pending(
        &mut self,
        channel_id: ChannelId,
        instrument: &Instrument,
        deliveries: &mut Vec<Delivery>,
    ) {
        let Some(held) = self.pending.remove(&channel_id) else {
            return;
        };
        self.held -= held.len();

        deliveries.extend(held.into_iter().map(|held| Delivery::Routed {
            instrument: instrument.clone(),
            channel_id,
            sequence: held.sequence,
            record: held.record,
        }));
    }

    fn reject_channel(
        &mut self,
        channel_id: ChannelId,
        pair: String,
        records: Vec<Record>,
        sequence: Sequence,
        dispatch: &mut Dispatch,
    ) {
        let reason = UnmappedReason::UnknownPair(pair.clone());

        if let Some(held) = self.pending.remove(&channel_id) {
            self.held -= held.len();
            dispatch.deliveries.extend(held.into_iter().map(|held| Delivery::Unmapped {
                channel_id,
                sequence: held.sequence,
                record: held.record,
                reason: reason.clone(),
            }));
        }

        dispatch.deliveries.extend(records.into_iter().map(|record| Delivery::Unmapped {
            channel_id,
            sequence,
            record,
            reason: reason.clone(),
        }));

        self.foreign.insert(channel_id, pair);
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::records::{BookSide, OrderDelta, Snapshot};

    fn router(symbols: &[&str]) -> ChannelRouter {
        let mut router = ChannelRouter::new(16);
        for symbol in symbols {
            router.register(Instrument::parse(symbol).unwrap());
        }
        router
    }

    fn snapshot(pair: &str) -> Record {
        Record::Snapshot(Snapshot {
            currency_pair: pair.to_string(),
            asks: vec![],
            bids: vec![],
            event_time_ms: 1,
        })
    }

    fn delta(price: i64) -> Record {
        Record::OrderDelta(OrderDelta {
            side: BookSide::Bid,
            price: Decimal::new(price, 0),
            size: Decimal::ONE,
            event_time_ms: 2,
        })
    }

    fn frame(channel_id: ChannelId, sequence: Sequence, records: Vec<Record>) -> SequencedMessage {
        SequencedMessage {
            channel_id,
            sequence,
            records,
        }
    }

    fn routed_symbol(delivery: &Delivery) -> Option<String> {
        match delivery {
            Delivery::Routed { instrument, .. } => Some(instrument.symbol()),
            Delivery::Unmapped { .. } => None,
        }
    }

    #[test]
    fn snapshot_teaches_channel() {
        let mut router = router(&["BTC_USDT", "ETH_USDT"]);

        let dispatch = router.dispatch(frame(121, 1, vec![snapshot("USDT_BTC")]));

        let (id, instrument) = dispatch.learned.unwrap();
        assert_eq!(id, 121);
        assert_eq!(instrument.symbol(), "BTC_USDT");
        assert_eq!(dispatch.deliveries.len(), 1);
        assert_eq!(routed_symbol(&dispatch.deliveries[0]).as_deref(), Some("BTC_USDT"));
        assert_eq!(router.instrument_for(121).map(Instrument::symbol).as_deref(), Some("BTC_USDT"));
    }

    #[test]
    fn learned_channel_routes_later_frames() {
        let mut router = router(&["BTC_USDT"]);
        router.dispatch(frame(121, 1, vec![snapshot("USDT_BTC")]));

        let dispatch = router.dispatch(frame(121, 2, vec![delta(10), delta(11)]));

        assert!(dispatch.learned.is_none());
        assert_eq!(dispatch.deliveries.len(), 2);
        assert!(dispatch.deliveries.iter().all(|d| routed_symbol(d).is_some()));
    }

    #[test]
    fn early_records_are_released_once_learned() {
        let mut router = router(&["ETH_USDT"]);

        let early = router.dispatch(frame(149, 1, vec![delta(1)]));
        assert!(early.deliveries.is_empty());
        assert_eq!(router.pending_count(), 1);

        let dispatch = router.dispatch(frame(149, 2, vec![snapshot("USDT_ETH"), delta(2)]));

        assert_eq!(router.pending_count(), 0);
        assert_eq!(dispatch.deliveries.len(), 3);
        match &dispatch.deliveries[0] {
            Delivery::Routed {
                sequence, record, ..
            } => {
                assert_eq!(*sequence, 1);
                assert_eq!(record, &delta(1));
            }
            other => panic!("expected routed record, got {other:?}"),
        }
        assert!(dispatch.deliveries.iter().all(|d| routed_symbol(d).as_deref() == Some("ETH_USDT")));
    }

    #[test]
    fn overflow_goes_to_unmapped() {
        let mut router = ChannelRouter::new(1);
        router.register(Instrument::parse("BTC_USDT").unwrap());

        let dispatch = router.dispatch(frame(7, 1, vec![delta(1), delta(2)]));

        assert_eq!(router.pending_count(), 1);
        assert_eq!(dispatch.deliveries.len(), 1);
        assert!(matches!(
            dispatch.deliveries[0],
            Delivery::Unmapped {
                reason: UnmappedReason::PendingOverflow,
                ..
            }
        ));
    }

    #[test]
    fn zero_limit_routes_straight_to_unmapped() {
        let mut router = ChannelRouter::new(0);

        let dispatch = router.dispatch(frame(7, 1, vec![delta(1)]));

        assert_eq!(router.pending_count(), 0);
        assert_eq!(dispatch.deliveries.len(), 1);
    }

    #[test]
    fn many_unknown_channels_share_one_hold_budget() {
        let mut router = ChannelRouter::new(2);
        router.register(Instrument::parse("BTC_USDT").unwrap());

        let first = router.dispatch(frame(7, 1, vec![delta(1), delta(2)]));
        let second = router.dispatch(frame(8, 1, vec![delta(3)]));

        assert!(first.deliveries.is_empty());
        assert_eq!(router.pending_count(), 2);
        assert!(matches!(
            second.deliveries.as_slice(),
            [Delivery::Unmapped {
                channel_id: 8,
                reason: UnmappedReason::PendingOverflow,
                ..
            }]
        ));

        router.dispatch(frame(7, 2, vec![snapshot("USDT_BTC")]));
        assert_eq!(router.pending_count(), 0);

        let third = router.dispatch(frame(8, 2, vec![delta(4)]));
        assert!(third.deliveries.is_empty());
        assert_eq!(router.pending_count(), 1);
    }

    #[test]
    fn hold_budget_grows_with_registered_instruments() {
        let mut router = ChannelRouter::new(1);
        router.register(Instrument::parse("BTC_USDT").unwrap());
        router.register(Instrument::parse("ETH_USDT").unwrap());

        router.dispatch(frame(7, 1, vec![delta(1)]));
        router.dispatch(frame(8, 1, vec![delta(2)]));
        let third = router.dispatch(frame(9, 1, vec![delta(3)]));

        assert_eq!(router.pending_count(), 2);
        assert_eq!(third.deliveries.len(), 1);
    }

    #[test]
    fn malformed_pair_is_unmapped() {
        let mut router = router(&["BTC_USDT"]);

        let dispatch = router.dispatch(frame(300, 1, vec![snapshot("USDTBTC")]));

        assert!(dispatch.learned.is_none());
        assert!(matches!(
            &dispatch.deliveries[0],
            Delivery::Unmapped { reason: UnmappedReason::UnknownPair(pair), .. } if pair == "USDTBTC"
        ));
    }

    #[test]
    fn reversed_pair_does_not_match() {
        let mut router = router(&["BTC_USDT"]);

        let dispatch = router.dispatch(frame(301, 1, vec![snapshot("BTC_USDT")]));

        assert!(dispatch.learned.is_none());
        assert!(routed_symbol(&dispatch.deliveries[0]).is_none());
    }

    #[test]
    fn unsubscribed_pair_is_unmapped_for_good() {
        let mut router = router(&["BTC_USDT"]);

        let first = router.dispatch(frame(200, 1, vec![snapshot("USDT_DOGE")]));
        assert!(first.learned.is_none());
        assert!(matches!(
            &first.deliveries[0],
            Delivery::Unmapped { reason: UnmappedReason::UnknownPair(pair), .. } if pair == "USDT_DOGE"
        ));

        let later = router.dispatch(frame(200, 2, vec![delta(3)]));
        assert_eq!(later.deliveries.len(), 1);
        assert!(routed_symbol(&later.deliveries[0]).is_none());
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn drain_flushes_held_records() {
        let mut router = router(&["BTC_USDT"]);
        router.dispatch(frame(9, 4, vec![delta(1)]));
        router.dispatch(frame(3, 8, vec![delta(2)]));

        let drained = router.drain();

        assert_eq!(drained.len(), 2);
        assert!(matches!(
            drained[0],
            Delivery::Unmapped {
                channel_id: 3,
                sequence: 8,
                reason: UnmappedReason::NeverLearned,
                ..
            }
        ));
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn regression_is_reported_with_delivery() {
        let mut router = router(&["BTC_USDT"]);
        router.dispatch(frame(5, 100, vec![snapshot("USDT_BTC")]));

        let dispatch = router.dispatch(frame(5, 97, vec![delta(1)]));

        let regression = dispatch.regression.unwrap();
        assert_eq!(regression.previous, 100);
        assert_eq!(regression.current, 97);
        assert_eq!(dispatch.deliveries.len(), 1);
    }

    #[test]
    fn learned_channels_are_sorted() {
        let mut router = router(&["BTC_USDT", "ETH_USDT"]);
        router.dispatch(frame(149, 1, vec![snapshot("USDT_ETH")]));
        router.dispatch(frame(121, 1, vec![snapshot("USDT_BTC")]));

        let learned: Vec<_> = router
            .learned_channels()
            .into_iter()
            .map(|(id, instrument)| (id, instrument.symbol()))
            .collect();
        assert_eq!(
            learned,
            vec![(121, "BTC_USDT".to_string()), (149, "ETH_USDT".to_string())]
        );
    }
}

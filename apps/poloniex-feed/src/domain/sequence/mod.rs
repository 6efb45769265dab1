//! Sequence Tracking
//!
//! Sequence numbers must never go backwards on a channel for the life of a
//! connection. Equal numbers are accepted; a decrease means the feed reset or
//! updates were lost and is reported to the caller.

use std::collections::HashMap;

use super::records::{ChannelId, Sequence};

/// A sequence number lower than the last one seen on the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRegression {
    /// Channel the regression was observed on.
    pub channel_id: ChannelId,
    /// Last sequence number accepted before this frame.
    pub previous: Sequence,
    /// Sequence number of the offending frame.
    pub current: Sequence,
}

/// Last seen sequence number per channel.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_seen: HashMap<ChannelId, Sequence>,
}

impl SequenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame's sequence number.
    ///
    /// The tracker always moves to `sequence`, so a reset is reported once and
    /// later frames are compared against the new baseline.
    pub fn observe(
        &mut self,
        channel_id: ChannelId,
        sequence: Sequence,
    ) -> Option<SequenceRegression> {
        let previous = self.last_seen.insert(channel_id, sequence)?;

        (sequence < previous).then_some(SequenceRegression {
            channel_id,
            previous,
            current: sequence,
        })
    }

    /// Last sequence number seen on a channel.
    #[must_use]
    pub fn last(&self, channel_id: ChannelId) -> Option<Sequence> {
        self.last_seen.get(&channel_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_accepted() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(5, 100), None);
        assert_eq!(tracker.last(5), Some(100));
    }

    #[test]
    fn decrease_is_reported() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(5, 100);

        let regression = tracker.observe(5, 97).unwrap();
        assert_eq!(
            regression,
            SequenceRegression {
                channel_id: 5,
                previous: 100,
                current: 97,
            }
        );
    }

    #[test]
    fn equal_and_increasing_are_accepted() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(5, 100), None);
        assert_eq!(tracker.observe(5, 100), None);
        assert_eq!(tracker.observe(5, 150), None);
    }

    #[test]
    fn baseline_moves_after_regression() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(5, 100);
        assert!(tracker.observe(5, 97).is_some());
        assert_eq!(tracker.observe(5, 98), None);
    }

    #[test]
    fn channels_are_independent() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(5, 100);
        assert_eq!(tracker.observe(6, 1), None);
        assert_eq!(tracker.last(5), Some(100));
    }
}

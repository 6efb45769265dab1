//! Channel Sink Adapter
//!
//! Forwards session events into a tokio mpsc channel so a separate task can
//! consume them.
//!
//! The channel is unbounded: the read loop never waits on a slow consumer.
//! A consumer that falls behind grows the queue instead.

use tokio::sync::mpsc;

use crate::application::ports::FeedSink;
use crate::infrastructure::poloniex::FeedEvent;

/// [`FeedSink`] that forwards into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl ChannelSink {
    /// Wrap an existing sender.
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<FeedEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl FeedSink<FeedEvent> for ChannelSink {
    fn deliver(&mut self, event: FeedEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::poloniex::SessionState;

    #[tokio::test]
    async fn forwards_events_in_order() {
        let (mut sink, mut rx) = ChannelSink::channel();

        sink.deliver(FeedEvent::StateChanged(SessionState::Connecting));
        sink.deliver(FeedEvent::StateChanged(SessionState::Subscribing));

        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::StateChanged(SessionState::Connecting))
        );
        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::StateChanged(SessionState::Subscribing))
        );
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (mut sink, rx) = ChannelSink::channel();
        drop(rx);

        sink.deliver(FeedEvent::StateChanged(SessionState::Closed));
    }
}

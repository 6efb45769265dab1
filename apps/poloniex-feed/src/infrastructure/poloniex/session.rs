//! Feed Session
//!
//! Drives one connection to the push API through its lifecycle:
//!
//! ```text
//! Connecting → Subscribing → Reading → Draining → Closed
//! ```
//!
//! Every configured instrument is subscribed in one burst before reading
//! starts. All instruments then share a single read loop; frames are routed
//! by channel id, which is learned from each channel's first snapshot.
//!
//! Only a failed connect aborts with an error. Everything else (bad symbols,
//! rejected subscriptions, undecodable frames, sequence regressions) is
//! reported to the sink as a [`Diagnostic`] and the loop carries on.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::codec::{DecodeError, DecodedFrame, FrameCodec, Inbound, RecordError};
use super::messages::{DEFAULT_FEED_URL, SubscribeCommand};
use crate::application::ports::{FeedConnection, FeedConnector, FeedSink, TransportError};
use crate::domain::instrument::{Instrument, InstrumentError};
use crate::domain::records::{ChannelId, Record, Sequence};
use crate::domain::routing::{ChannelRouter, Delivery, UnmappedReason};
use crate::domain::sequence::SequenceRegression;
use crate::infrastructure::metrics::{self as feed_metrics, RecordOutcome};

/// Default bound on records held per unlearned channel.
pub const DEFAULT_PENDING_LIMIT: usize = 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Push API endpoint.
    pub url: String,
    /// How long the session may run before draining, counted from the start
    /// of [`FeedSession::run`] so a stalled connect or subscribe is covered
    /// too. `None` runs until cancelled or the stream ends.
    pub deadline: Option<Duration>,
    /// Max records held per channel before its id is learned.
    pub pending_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            deadline: None,
            pending_limit: DEFAULT_PENDING_LIMIT,
        }
    }
}

impl SessionConfig {
    /// Config for `url` with default limits.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Stop the session `deadline` after it starts.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Override the per-channel hold limit.
    #[must_use]
    pub const fn with_pending_limit(mut self, pending_limit: usize) -> Self {
        self.pending_limit = pending_limit;
        self
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Dialing the feed.
    #[default]
    Connecting,
    /// Sending subscribe requests.
    Subscribing,
    /// Reading and routing frames.
    Reading,
    /// Flushing held records.
    Draining,
    /// Connection released. Terminal.
    Closed,
}

impl SessionState {
    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Reading => "reading",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The configured deadline elapsed.
    DeadlineElapsed,
    /// The cancellation token fired.
    Cancelled,
    /// The server closed the stream.
    StreamClosed,
    /// The connection failed mid-read.
    ReadFailed(TransportError),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineElapsed => f.write_str("deadline elapsed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::StreamClosed => f.write_str("stream closed"),
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
        }
    }
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Why the session stopped.
    pub termination: Termination,
    /// Text frames read, heartbeats included.
    pub frames_read: u64,
    /// Channel ids learned during the session, ordered by id.
    pub learned_channels: Vec<(ChannelId, Instrument)>,
    /// Subscriptions that could not be issued.
    pub subscribe_errors: Vec<SubscribeError>,
}

impl SessionReport {
    const fn stopped_while_connecting(termination: Termination) -> Self {
        Self {
            termination,
            frames_read: 0,
            learned_channels: Vec::new(),
            subscribe_errors: Vec::new(),
        }
    }
}

// =============================================================================
// Errors and Events
// =============================================================================

/// Fatal session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The feed could not be reached.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

/// A subscription that could not be issued. Other instruments proceed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// The configured symbol is not `BASE_QUOTE`.
    #[error(transparent)]
    InvalidInstrument(#[from] InstrumentError),

    /// The subscribe request could not be encoded.
    #[error("failed to encode subscribe request for {channel}: {reason}")]
    Encode {
        /// Wire channel name.
        channel: String,
        /// Encoder message.
        reason: String,
    },

    /// The subscribe request could not be written.
    #[error("failed to send subscribe request for {channel}: {reason}")]
    Send {
        /// Wire channel name.
        channel: String,
        /// Transport message.
        reason: String,
    },
}

impl SubscribeError {
    const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInstrument(_) => "invalid_instrument",
            Self::Encode { .. } => "encode",
            Self::Send { .. } => "send",
        }
    }
}

/// Non-fatal problem reported while the session keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A subscription could not be issued.
    Subscribe(SubscribeError),
    /// The server answered with an error object.
    SubscriptionRejected(String),
    /// A whole frame failed to decode.
    Frame(DecodeError),
    /// One record in a frame failed to decode.
    Record {
        /// Channel of the carrying frame.
        channel_id: ChannelId,
        /// Sequence of the carrying frame.
        sequence: Sequence,
        /// Position and cause.
        error: RecordError,
    },
    /// A channel's sequence number went backwards.
    SequenceRegression(SequenceRegression),
}

/// Everything the session hands to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The session moved to a new lifecycle state.
    StateChanged(SessionState),
    /// A subscribe request was sent.
    Subscribed {
        /// Subscribed instrument.
        instrument: Instrument,
        /// Wire channel name.
        channel: String,
    },
    /// A channel id was matched to an instrument.
    ChannelLearned {
        /// Wire channel id.
        channel_id: ChannelId,
        /// Instrument it carries.
        instrument: Instrument,
    },
    /// A record attributed to a configured instrument.
    Record {
        /// Originating instrument.
        instrument: Instrument,
        /// Wire channel id.
        channel_id: ChannelId,
        /// Sequence of the carrying frame.
        sequence: Sequence,
        /// The record.
        record: Record,
    },
    /// A record that could not be attributed to an instrument.
    Unmapped {
        /// Wire channel id.
        channel_id: ChannelId,
        /// Sequence of the carrying frame.
        sequence: Sequence,
        /// The record.
        record: Record,
        /// Why it is unmapped.
        reason: UnmappedReason,
    },
    /// A non-fatal problem.
    Diagnostic(Diagnostic),
}

impl From<Delivery> for FeedEvent {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Routed {
                instrument,
                channel_id,
                sequence,
                record,
            } => Self::Record {
                instrument,
                channel_id,
                sequence,
                record,
            },
            Delivery::Unmapped {
                channel_id,
                sequence,
                record,
                reason,
            } => Self::Unmapped {
                channel_id,
                sequence,
                record,
                reason,
            },
        }
    }
}

// =============================================================================
// Status Handle
// =============================================================================

/// Live view of a running session, shareable across tasks.
#[derive(Debug, Default)]
pub struct SessionStatus {
    state: parking_lot::RwLock<SessionState>,
    frames_read: AtomicU64,
    records_routed: AtomicU64,
    records_unmapped: AtomicU64,
    diagnostics: AtomicU64,
    channels_learned: AtomicUsize,
}

impl SessionStatus {
    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    fn increment_frames(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn get_state(&self) -> SessionState {
        *self.state.read()
    }

    /// Text frames read so far.
    #[must_use]
    pub fn get_frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::Relaxed)
    }

    /// Records delivered to an instrument.
    #[must_use]
    pub fn get_records_routed(&self) -> u64 {
        self.records_routed.load(Ordering::Relaxed)
    }

    /// Records delivered as unmapped.
    #[must_use]
    pub fn get_records_unmapped(&self) -> u64 {
        self.records_unmapped.load(Ordering::Relaxed)
    }

    /// Diagnostics emitted.
    #[must_use]
    pub fn get_diagnostics(&self) -> u64 {
        self.diagnostics.load(Ordering::Relaxed)
    }

    /// Channel ids learned.
    #[must_use]
    pub fn get_channels_learned(&self) -> usize {
        self.channels_learned.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Session
// =============================================================================

/// One connection's worth of subscribe, read and route.
#[derive(Debug)]
pub struct FeedSession<S> {
    config: SessionConfig,
    codec: FrameCodec,
    sink: S,
    cancel: CancellationToken,
    status: Arc<SessionStatus>,
}

impl<S: FeedSink<FeedEvent>> FeedSession<S> {
    /// Create a session that delivers into `sink` and stops when `cancel`
    /// fires.
    #[must_use]
    pub fn new(config: SessionConfig, sink: S, cancel: CancellationToken) -> Self {
        Self {
            config,
            codec: FrameCodec::new(),
            sink,
            cancel,
            status: Arc::new(SessionStatus::default()),
        }
    }

    /// Shared status handle.
    #[must_use]
    pub fn status(&self) -> Arc<SessionStatus> {
        Arc::clone(&self.status)
    }

    /// The sink events are delivered to.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Connect, subscribe to `symbols`, and read until the deadline,
    /// cancellation, or the end of the stream.
    ///
    /// The deadline and the cancellation token are raced against every
    /// await: connecting, each subscribe write, and each read.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] if the feed cannot be reached. Every
    /// other failure is reported through the sink and the returned report.
    pub async fn run<C, T>(
        &mut self,
        connector: &C,
        symbols: &[T],
    ) -> Result<SessionReport, SessionError>
    where
        C: FeedConnector,
        T: AsRef<str> + Sync,
    {
        let stop = StopSignal {
            cancel: self.cancel.clone(),
            deadline: self.config.deadline.map(|d| Instant::now() + d),
        };
        let url = self.config.url.clone();

        self.set_state(SessionState::Connecting);
        tracing::info!(url = %url, instruments = symbols.len(), "Connecting to Poloniex feed");

        let connected = tokio::select! {
            biased;
            termination = stop.fired() => Err(termination),
            result = connector.connect(&url) => Ok(result),
        };

        let mut conn = match connected {
            Err(termination) => {
                tracing::info!(termination = %termination, "Feed session stopped while connecting");
                self.set_state(SessionState::Closed);
                return Ok(SessionReport::stopped_while_connecting(termination));
            }
            Ok(Err(source)) => {
                tracing::warn!(url = %url, error = %source, "Failed to connect to Poloniex feed");
                self.set_state(SessionState::Closed);
                return Err(SessionError::Connect { url, source });
            }
            Ok(Ok(conn)) => conn,
        };

        let mut router = ChannelRouter::new(self.config.pending_limit);
        let mut subscribe_errors = Vec::new();

        self.set_state(SessionState::Subscribing);
        let subscribed = self
            .subscribe_all(&mut conn, &mut router, symbols, &stop, &mut subscribe_errors)
            .await;

        let termination = match subscribed {
            Ok(()) => {
                self.set_state(SessionState::Reading);
                self.read_loop(&mut conn, &mut router, &stop).await
            }
            Err(termination) => termination,
        };
        tracing::info!(termination = %termination, "Feed session stopped");

        self.set_state(SessionState::Draining);
        for delivery in router.drain() {
            self.deliver(delivery);
        }
        conn.close().await;

        self.set_state(SessionState::Closed);

        Ok(SessionReport {
            termination,
            frames_read: self.status.get_frames_read(),
            learned_channels: router.learned_channels(),
            subscribe_errors,
        })
    }

    /// Send one subscribe request per symbol. Failures are collected into
    /// `errors` and reported; they never stop the remaining subscriptions.
    /// Only `stop` firing does, which skips reading altogether.
    async fn subscribe_all<Conn, T>(
        &mut self,
        conn: &mut Conn,
        router: &mut ChannelRouter,
        symbols: &[T],
        stop: &StopSignal,
        errors: &mut Vec<SubscribeError>,
    ) -> Result<(), Termination>
    where
        Conn: FeedConnection,
        T: AsRef<str> + Sync,
    {
        for symbol in symbols {
            let outcome = tokio::select! {
                biased;
                termination = stop.fired() => {
                    tracing::info!(
                        termination = %termination,
                        subscribed = router.registered_count(),
                        "Feed session stopped while subscribing"
                    );
                    return Err(termination);
                }
                outcome = self.subscribe_one(conn, router, symbol.as_ref()) => outcome,
            };

            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(symbol = symbol.as_ref(), "Duplicate instrument, skipping");
                }
                Err(error) => {
                    tracing::warn!(symbol = symbol.as_ref(), error = %error, "Subscription failed");
                    feed_metrics::record_subscribe_failure(error.kind());
                    self.emit(Diagnostic::Subscribe(error.clone()));
                    errors.push(error);
                }
            }
        }

        tracing::info!(
            subscribed = router.registered_count(),
            failed = errors.len(),
            "Subscriptions sent"
        );
        Ok(())
    }

    /// Returns `Ok(false)` when the instrument was already subscribed.
    async fn subscribe_one<Conn: FeedConnection>(
        &mut self,
        conn: &mut Conn,
        router: &mut ChannelRouter,
        symbol: &str,
    ) -> Result<bool, SubscribeError> {
        let instrument = Instrument::parse(symbol)?;
        if router.is_registered(&instrument) {
            return Ok(false);
        }

        let channel = instrument.channel();
        let json = SubscribeCommand::subscribe(channel.clone())
            .to_json()
            .map_err(|e| SubscribeError::Encode {
                channel: channel.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(channel = %channel, "Sending subscribe request");
        conn.send_text(json)
            .await
            .map_err(|e| SubscribeError::Send {
                channel: channel.clone(),
                reason: e.to_string(),
            })?;

        router.register(instrument.clone());
        self.sink.deliver(FeedEvent::Subscribed {
            instrument,
            channel,
        });
        Ok(true)
    }

    async fn read_loop<Conn: FeedConnection>(
        &mut self,
        conn: &mut Conn,
        router: &mut ChannelRouter,
        stop: &StopSignal,
    ) -> Termination {
        loop {
            if let Some(termination) = stop.check() {
                return termination;
            }

            tokio::select! {
                biased;

                termination = stop.fired() => return termination,

                next = conn.next_text() => match next {
                    Some(Ok(text)) => self.handle_text(&text, router),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Feed read failed");
                        return Termination::ReadFailed(e);
                    }
                    None => {
                        tracing::info!("Feed stream ended");
                        return Termination::StreamClosed;
                    }
                },
            }
        }
    }

    fn handle_text(&mut self, text: &str, router: &mut ChannelRouter) {
        self.status.increment_frames();
        feed_metrics::record_frame_received();

        match self.codec.read(text) {
            Inbound::Heartbeat => tracing::trace!("Heartbeat"),
            Inbound::ServerError(message) => {
                tracing::warn!(message = %message, "Server rejected request");
                feed_metrics::record_subscribe_failure("rejected");
                self.emit(Diagnostic::SubscriptionRejected(message));
            }
            Inbound::Data(Err(error)) => {
                tracing::warn!(error = %error, "Dropping undecodable frame");
                feed_metrics::record_decode_error(error.kind());
                self.emit(Diagnostic::Frame(error));
            }
            Inbound::Data(Ok(frame)) => self.dispatch(frame, router),
        }
    }

    fn dispatch(&mut self, frame: DecodedFrame, router: &mut ChannelRouter) {
        let DecodedFrame { message, errors } = frame;
        let (channel_id, sequence) = (message.channel_id, message.sequence);

        for error in errors {
            tracing::warn!(
                channel_id,
                sequence,
                index = error.index,
                error = %error.error,
                "Skipping undecodable record"
            );
            feed_metrics::record_decode_error(error.error.kind());
            self.emit(Diagnostic::Record {
                channel_id,
                sequence,
                error,
            });
        }

        let dispatch = router.dispatch(message);

        if let Some(regression) = dispatch.regression {
            tracing::warn!(
                channel_id = regression.channel_id,
                previous = regression.previous,
                current = regression.current,
                "Sequence regression"
            );
            feed_metrics::record_sequence_regression();
            self.emit(Diagnostic::SequenceRegression(regression));
        }

        if let Some((channel_id, instrument)) = dispatch.learned {
            tracing::info!(channel_id, instrument = %instrument, "Learned channel");
            self.status.channels_learned.fetch_add(1, Ordering::Relaxed);
            self.sink.deliver(FeedEvent::ChannelLearned {
                channel_id,
                instrument,
            });
        }

        for delivery in dispatch.deliveries {
            self.deliver(delivery);
        }
    }

    fn deliver(&mut self, delivery: Delivery) {
        let (kind, outcome, counter) = match &delivery {
            Delivery::Routed { record, .. } => {
                (record.kind(), RecordOutcome::Routed, &self.status.records_routed)
            }
            Delivery::Unmapped { record, .. } => (
                record.kind(),
                RecordOutcome::Unmapped,
                &self.status.records_unmapped,
            ),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        feed_metrics::record_record(kind, outcome);

        self.sink.deliver(delivery.into());
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        self.status.diagnostics.fetch_add(1, Ordering::Relaxed);
        self.sink.deliver(FeedEvent::Diagnostic(diagnostic));
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(state = %state, "Session state changed");
        self.status.set_state(state);
        self.sink.deliver(FeedEvent::StateChanged(state));
    }
}

/// Cancellation token plus the session's absolute deadline.
struct StopSignal {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl StopSignal {
    /// Non-blocking check, cancellation first.
    fn check(&self) -> Option<Termination> {
        if self.cancel.is_cancelled() {
            Some(Termination::Cancelled)
        } else if self.deadline.is_some_and(|at| Instant::now() >= at) {
            Some(Termination::DeadlineElapsed)
        } else {
            None
        }
    }

    /// Resolves once either signal fires, cancellation first.
    async fn fired(&self) -> Termination {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Termination::Cancelled,
            () = sleep_until_deadline(self.deadline) => Termination::DeadlineElapsed,
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

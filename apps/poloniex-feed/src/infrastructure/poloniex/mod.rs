//! Poloniex Push API Adapters
//!
//! - **Messages**: wire format types for subscribe requests and snapshots
//! - **Coercion**: raw token to typed scalar conversion
//! - **Codec**: positional frame decoding with a fixed arity table
//! - **Transport**: tokio-tungstenite connection
//! - **Session**: connect, subscribe, read and route lifecycle

pub mod codec;
pub mod coerce;
pub mod messages;
pub mod session;
pub mod transport;

pub use codec::{DecodeError, DecodedFrame, FrameCodec, Inbound, RecordError};
pub use messages::{
    DEFAULT_FEED_URL, HEARTBEAT_CHANNEL, ServerErrorMessage, SubscribeCommand, SubscriptionCommand,
};
pub use session::{
    DEFAULT_PENDING_LIMIT, Diagnostic, FeedEvent, FeedSession, SessionConfig, SessionError,
    SessionReport, SessionState, SessionStatus, SubscribeError, Termination,
};
pub use transport::{WsConnection, WsConnector};

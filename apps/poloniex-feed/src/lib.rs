#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::type_complexity,
        clippy::items_after_statements
    )
)]

//! Poloniex Feed - Order Book Stream Client
//!
//! Maintains a single WebSocket connection to the Poloniex push API,
//! subscribes to a set of currency pairs, and decodes the multiplexed
//! order book stream into typed records routed per instrument.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and routing logic
//!   - `instrument`: Symbol ⇄ channel name mapping
//!   - `records`: Snapshot, order delta and trade records
//!   - `routing`: Channel id → instrument learning and buffering
//!   - `sequence`: Per-channel sequence regression detection
//!
//! - **Application**: Port definitions
//!   - `ports`: Feed connection and event sink contracts
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `poloniex`: Frame codec, WebSocket transport, feed session
//!   - `sink`: mpsc event adapter
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! symbols ──► subscribe ──► WS ──► FrameCodec ──► ChannelRouter ──► FeedSink
//!                                                      │
//!                                                      └──► unmapped
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::instrument::{Instrument, InstrumentError, to_channel};
pub use domain::records::{
    BookSide, ChannelId, OrderDelta, PriceLevel, Record, Sequence, SequencedMessage, Snapshot,
    Trade, TradeSide,
};
pub use domain::routing::{ChannelRouter, Delivery, UnmappedReason};
pub use domain::sequence::{SequenceRegression, SequenceTracker};

// Ports
pub use application::ports::{FeedConnection, FeedConnector, FeedSink, TransportError};

// Poloniex adapters
pub use infrastructure::poloniex::{
    DecodeError, DecodedFrame, Diagnostic, FeedEvent, FeedSession, FrameCodec, SessionConfig,
    SessionError, SessionReport, SessionState, SessionStatus, SubscribeError, Termination,
    WsConnector,
};
pub use infrastructure::sink::ChannelSink;

// Configuration
pub use infrastructure::config::{ConfigError, FeedConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement, following the
//! Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector` / `FeedConnection`: dial the push API and exchange text frames
//! - `FeedSink`: receive everything the session produces

use async_trait::async_trait;

// =============================================================================
// Transport
// =============================================================================

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// The connection failed while reading.
    #[error("read failed: {0}")]
    Read(String),
}

/// An open, text-framed feed connection.
#[async_trait]
pub trait FeedConnection: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Read the next text frame.
    ///
    /// Returns `None` once the peer has closed the stream. Control frames are
    /// handled by the adapter and never surface here.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Release the connection.
    async fn close(&mut self);
}

/// Factory for feed connections.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Connection type produced by this connector.
    type Connection: FeedConnection + 'static;

    /// Dial the feed at `url`.
    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError>;
}

// =============================================================================
// Event Delivery
// =============================================================================

/// Consumer of session events of type `E`.
///
/// Called synchronously from the read loop, so implementations must not
/// block.
pub trait FeedSink<E>: Send {
    /// Accept one event.
    fn deliver(&mut self, event: E);
}

impl<E: Send> FeedSink<E> for Vec<E> {
    fn deliver(&mut self, event: E) {
        self.push(event);
    }
}

//! WebSocket Transport
//!
//! [`FeedConnector`] over tokio-tungstenite. Pings are answered in place,
//! close frames end the stream, and binary frames are ignored since the push
//! API only speaks text.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FeedConnection, FeedConnector, TransportError};

/// Dials the push API over WebSocket (TLS for `wss://` URLs).
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self, url: &str) -> Result<WsConnection, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(url = %url, "WebSocket connected");
        Ok(WsConnection { stream })
    }
}

/// Open WebSocket connection to the feed.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(TransportError::Send(e.to_string())));
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(frame = ?frame, "Server closed connection");
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    tracing::debug!(len = data.len(), "Ignoring binary frame");
                }
                Ok(Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error closing WebSocket");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one connection that sends `frames` and then closes.
    async fn serve(frames: Vec<Message>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for frame in frames {
                ws.send(frame).await.unwrap();
            }
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn yields_text_and_skips_control_frames() {
        let url = serve(vec![
            Message::Ping(vec![1, 2].into()),
            Message::Binary(vec![0xff].into()),
            Message::Text("[1010]".into()),
        ])
        .await;

        let mut conn = WsConnector::new().connect(&url).await.unwrap();

        assert_eq!(conn.next_text().await, Some(Ok("[1010]".to_string())));
        assert_eq!(conn.next_text().await, None);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnector::new().connect(&format!("ws://{addr}")).await;

        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}

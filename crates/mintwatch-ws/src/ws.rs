//! WebSocket transport backed by tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use mintwatch_core::StreamError;

use crate::transport::{Connector, FrameTransport};

/// Opens `ws://` / `wss://` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>, StreamError> {
        let (stream, _) = connect_async(url).await.map_err(|e| match e {
            WsError::Url(reason) => StreamError::InvalidUrl {
                url: url.to_string(),
                reason: reason.to_string(),
            },
            e => StreamError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            },
        })?;
        Ok(Box::new(WsTransport {
            stream,
            closed: false,
        }))
    }
}

/// A live WebSocket. Dropping it drops the socket.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), StreamError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StreamError::WebSocket(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), StreamError> {
        self.stream
            .send(Message::Ping(Vec::<u8>::new().into()))
            .await
            .map_err(|e| StreamError::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!(len = bytes.len(), "skipping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "close frame received");
                    return None;
                }
                // tungstenite answers pings itself on the next read/write
                Ok(_) => {}
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(StreamError::WebSocket(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "error while closing WebSocket");
        }
    }
}

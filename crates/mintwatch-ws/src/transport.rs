//! Transport seam between `StreamConnection` and the wire.
//!
//! `StreamConnection` only needs text frames in, text frames and pings out,
//! and a close. [`WsConnector`](crate::ws::WsConnector) provides that over
//! tokio-tungstenite; [`MockConnector`](crate::mock::MockConnector) provides
//! it from a script.

use async_trait::async_trait;
use mintwatch_core::StreamError;

/// One established, exclusively owned transport handle.
#[async_trait]
pub trait FrameTransport: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), StreamError>;

    /// Send a transport-level keep-alive ping.
    async fn ping(&mut self) -> Result<(), StreamError>;

    /// Next text frame.
    ///
    /// - `Some(Ok(text))` — a frame arrived
    /// - `Some(Err(e))` — the transport failed
    /// - `None` — the transport was closed
    ///
    /// Must be cancel-safe: the connection selects it against its heartbeat
    /// timer and stop signal.
    async fn recv(&mut self) -> Option<Result<String, StreamError>>;

    /// Close the handle. Idempotent; errors are swallowed.
    async fn close(&mut self);
}

/// Opens transports. Shared by every connection of a process.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>, StreamError>;
}

//! mintwatch-ws — program-log subscription over WebSocket.
//!
//! # Features
//! - `programSubscribe` handshake with acknowledgment and timeout
//! - Keep-alive pings on a fixed interval
//! - Fixed-delay reconnect, retried until stopped
//! - Cooperative stop via a `watch` channel
//! - Scripted [`MockConnector`] for tests and offline replay

pub mod config;
pub mod connection;
pub mod mock;
pub mod transport;
pub mod ws;

pub use config::StreamConfig;
pub use connection::{ConnectionState, StreamConnection};
pub use mock::{MockConnector, MockFrame, SessionHandle};
pub use transport::{Connector, FrameTransport};
pub use ws::{WsConnector, WsTransport};

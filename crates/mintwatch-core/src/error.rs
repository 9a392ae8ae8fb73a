//! Error taxonomy for the ingestion pipeline.
//!
//! None of these are fatal to the process: stream errors feed the reconnect
//! path, enrichment errors degrade a notification, and delivery errors are
//! logged while the subscription still retires.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors raised by a stream connection or while reading its frames.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The transport could not be established.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The endpoint URL cannot be connected to at all; retrying won't help.
    #[error("invalid endpoint {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A connect or subscribe handshake did not finish in time.
    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node answered the subscribe request with an error.
    #[error("subscription rejected: {0}")]
    SubscribeRejected(JsonRpcError),

    /// A frame lacked fields the extractor requires. The frame is dropped,
    /// the connection stays open.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// The transport was closed, by the peer or locally.
    #[error("transport closed")]
    Closed,

    /// WebSocket send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The owning subscription asked the connection to stop.
    #[error("cancelled")]
    Cancelled,
}

impl StreamError {
    /// Returns `true` if the connection should go through the reconnect path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Timeout { .. }
                | Self::SubscribeRejected(_)
                | Self::Closed
                | Self::WebSocket(_)
        )
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }
}

/// Errors from the token enrichment collaborator.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("no account data for {mint}")]
    NotFound { mint: String },

    #[error("Deserialization error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("enrichment timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Errors from a delivery channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The receiving side of an in-process channel is gone.
    #[error("delivery channel closed")]
    ChannelClosed,

    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("delivery rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StreamError::Closed.is_retryable());
        assert!(StreamError::Timeout { ms: 10_000 }.is_retryable());
        assert!(StreamError::Connect {
            url: "wss://x".into(),
            reason: "refused".into()
        }
        .is_retryable());
        assert!(!StreamError::Cancelled.is_retryable());
        assert!(!StreamError::InvalidUrl {
            url: "http://x".into(),
            reason: "unsupported scheme".into()
        }
        .is_retryable());
        assert!(!StreamError::malformed("no logs").is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let e = DeliveryError::Rejected {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(e.to_string(), "delivery rejected with HTTP 502: bad gateway");
    }
}

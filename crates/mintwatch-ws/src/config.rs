//! Stream connection configuration.

use mintwatch_core::{ExtractorConfig, PUMP_FUN_PROGRAM};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by every `StreamConnection` of a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket RPC endpoint, e.g. "wss://api.mainnet-beta.solana.com"
    pub ws_url: String,
    /// Program whose account activity is subscribed to
    #[serde(default = "default_program_id")]
    pub program_id: String,
    /// Commitment level requested for notifications
    #[serde(default = "default_commitment")]
    pub commitment: String,
    /// Keep-alive ping interval in milliseconds
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_interval_ms: u64,
    /// Fixed delay before any reconnect attempt, in milliseconds
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound on connect + subscribe handshake, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

fn default_program_id() -> String { PUMP_FUN_PROGRAM.to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_heartbeat_ms() -> u64 { 30_000 }
fn default_reconnect_ms() -> u64 { 5_000 }
fn default_connect_timeout_ms() -> u64 { 10_000 }

impl StreamConfig {
    /// Defaults for everything but the endpoint.
    pub fn for_url(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            program_id: default_program_id(),
            commitment: default_commitment(),
            heartbeat_interval_ms: default_heartbeat_ms(),
            reconnect_delay_ms: default_reconnect_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            extractor: ExtractorConfig::default(),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

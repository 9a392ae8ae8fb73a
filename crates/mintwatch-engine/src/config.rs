//! Engine and enrichment configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the dedup window and the dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a seen mint is suppressed, in seconds
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Interval of the background dedup sweeper, in seconds (0 disables it)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Upper bound on one enrichment call, in milliseconds
    #[serde(default = "default_enrich_timeout_ms")]
    pub enrich_timeout_ms: u64,
}

fn default_dedup_ttl_secs() -> u64 { 300 }
fn default_sweep_interval_secs() -> u64 { 60 }
fn default_enrich_timeout_ms() -> u64 { 10_000 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_secs: default_dedup_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            enrich_timeout_ms: default_enrich_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    /// `None` when the sweeper is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_millis(self.enrich_timeout_ms)
    }
}

/// Endpoints used by [`RpcEnricher`](crate::enrich::RpcEnricher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// HTTP JSON-RPC endpoint for `getAccountInfo` / `getSlot`
    pub http_url: String,
    /// Base URL of the price API
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
    /// Sent as `X-API-KEY`; price lookups are skipped without it
    #[serde(default)]
    pub price_api_key: Option<String>,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_price_api_url() -> String { "https://public-api.birdeye.so".to_string() }
fn default_request_timeout_ms() -> u64 { 8_000 }

impl EnrichConfig {
    pub fn for_url(http_url: impl Into<String>) -> Self {
        Self {
            http_url: http_url.into(),
            price_api_url: default_price_api_url(),
            price_api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

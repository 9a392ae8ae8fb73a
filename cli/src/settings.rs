//! Settings for `mintwatch watch`.
//!
//! Layered lowest to highest: built-in defaults, the `--config` JSON file,
//! environment variables, command-line flags. Clap folds the last two
//! together; this module overlays them onto the file.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

use mintwatch_engine::{EngineConfig, EnrichConfig};
use mintwatch_observability::LogConfig;
use mintwatch_ws::StreamConfig;

pub const MAINNET_WS_URL: &str = "wss://api.mainnet-beta.solana.com";
pub const MAINNET_HTTP_URL: &str = "https://api.mainnet-beta.solana.com";

/// Values that may come from flags or the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub ws_url: Option<String>,
    pub http_url: Option<String>,
    pub program: Option<String>,
    pub webhook_url: Option<String>,
    pub price_api_key: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    pub no_enrich: bool,
}

/// Fully resolved watch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub stream: StreamConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default)]
    pub price_api_url: Option<String>,
    #[serde(default)]
    pub price_api_key: Option<String>,
    /// Look up name, symbol and price for each notice
    #[serde(default = "default_enrich")]
    pub enrich: bool,
    /// Deliver notices to this URL instead of stdout
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_http_url() -> String { MAINNET_HTTP_URL.to_string() }
fn default_enrich() -> bool { true }

impl Settings {
    pub fn resolve(config: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut doc = match config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read config file '{}'", path.display()))?;
                serde_json::from_str::<Value>(&text)
                    .with_context(|| format!("parse config file '{}'", path.display()))?
            }
            None => json!({}),
        };

        if let Some(url) = &overrides.ws_url {
            set(&mut doc, Some("stream"), "ws_url", json!(url))?;
        }
        if doc.pointer("/stream/ws_url").is_none() {
            set(&mut doc, Some("stream"), "ws_url", json!(MAINNET_WS_URL))?;
        }
        if let Some(program) = &overrides.program {
            set(&mut doc, Some("stream"), "program_id", json!(program))?;
        }
        if let Some(url) = &overrides.http_url {
            set(&mut doc, None, "http_url", json!(url))?;
        }
        if let Some(url) = &overrides.webhook_url {
            set(&mut doc, None, "webhook_url", json!(url))?;
        }
        if let Some(key) = &overrides.price_api_key {
            set(&mut doc, None, "price_api_key", json!(key))?;
        }
        if overrides.no_enrich {
            set(&mut doc, None, "enrich", json!(false))?;
        }
        if let Some(level) = &overrides.log_level {
            set(&mut doc, Some("log"), "level", json!(level))?;
        }
        if overrides.json_logs {
            set(&mut doc, Some("log"), "json", json!(true))?;
        }

        serde_json::from_value(doc).context("invalid settings")
    }

    pub fn enrich_config(&self) -> EnrichConfig {
        let mut config = EnrichConfig::for_url(&self.http_url);
        if let Some(url) = &self.price_api_url {
            config.price_api_url = url.clone();
        }
        config.price_api_key = self.price_api_key.clone().filter(|k| !k.is_empty());
        config
    }
}

fn set(doc: &mut Value, section: Option<&str>, key: &str, value: Value) -> Result<()> {
    let mut target = doc
        .as_object_mut()
        .ok_or_else(|| anyhow!("config root must be a JSON object"))?;
    if let Some(section) = section {
        target = target
            .entry(section)
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| anyhow!("config section '{section}' must be a JSON object"))?;
    }
    target.insert(key.to_string(), value);
    Ok(())
}

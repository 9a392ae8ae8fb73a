//! Global `tracing` subscriber for the binary and tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How much to log, where, and in which format.
///
/// Missing fields in a config file fall back to [`LogConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level or full filter directives for everything not listed in `targets`
    pub level: String,
    /// Per-crate level, keyed by crate name (`mintwatch-ws` or `mintwatch_ws`)
    pub targets: BTreeMap<String, String>,
    /// One JSON object per event instead of human-readable lines
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            targets: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directives, e.g. `"info,mintwatch_ws=debug"`.
    pub fn directives(&self) -> String {
        self.targets.iter().fold(self.level.clone(), |mut acc, (target, level)| {
            acc.push(',');
            acc.push_str(&target.replace('-', "_"));
            acc.push('=');
            acc.push_str(level);
            acc
        })
    }
}

/// Install the global subscriber, writing to stderr. Only the first call in
/// a process takes effect; an invalid filter falls back to `info`.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.directives())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}

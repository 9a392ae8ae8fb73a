//! `LogEventExtractor` — classifies `programSubscribe` notification frames.
//!
//! A frame qualifies when any of its transaction log lines contains the
//! mint-initialization signal. The mint address is then read from a fixed
//! position of the transaction's account keys. That position is a layout
//! convention of the watched program, not a search: a wrong index silently
//! reports the wrong address, so it is configurable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;
use crate::types::TokenEvent;

/// Log line emitted by the token program when a new mint is initialized.
pub const MINT_INIT_SIGNAL: &str = "Program log: Instruction: InitializeMint2";

/// Position of the new mint within the account keys of the watched program's
/// create transaction.
pub const DEFAULT_MINT_ACCOUNT_INDEX: usize = 1;

/// What the extractor looks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Substring that marks a qualifying log line.
    #[serde(default = "default_signal")]
    pub signal: String,
    /// Index into the account-key list holding the mint address.
    #[serde(default = "default_mint_index")]
    pub mint_account_index: usize,
}

fn default_signal() -> String {
    MINT_INIT_SIGNAL.to_string()
}

fn default_mint_index() -> usize {
    DEFAULT_MINT_ACCOUNT_INDEX
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            signal: default_signal(),
            mint_account_index: default_mint_index(),
        }
    }
}

/// Stateless frame classifier.
#[derive(Debug, Clone, Default)]
pub struct LogEventExtractor {
    config: ExtractorConfig,
}

impl LogEventExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Classify one text frame.
    ///
    /// - `Ok(None)` — not a notification, or no qualifying log line.
    /// - `Ok(Some(event))` — a new mint was initialized.
    /// - `Err(MalformedFrame)` — required fields are missing; drop the frame.
    pub fn extract(
        &self,
        frame: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<TokenEvent>, StreamError> {
        let v: Value = serde_json::from_str(frame)
            .map_err(|e| StreamError::malformed(format!("invalid JSON: {e}")))?;
        self.extract_value(&v, observed_at)
    }

    /// Same as [`extract`](Self::extract) for an already parsed frame.
    pub fn extract_value(
        &self,
        frame: &Value,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<TokenEvent>, StreamError> {
        // Subscription acks and other responses carry no `params.result`.
        let Some(result) = frame.get("params").and_then(|p| p.get("result")) else {
            return Ok(None);
        };
        let value = result
            .get("value")
            .ok_or_else(|| StreamError::malformed("missing params.result.value"))?;

        let logs = value
            .pointer("/transaction/meta/logMessages")
            .and_then(Value::as_array)
            .ok_or_else(|| StreamError::malformed("missing transaction.meta.logMessages"))?;

        let qualifies = logs
            .iter()
            .filter_map(Value::as_str)
            .any(|line| line.contains(&self.config.signal));
        if !qualifies {
            return Ok(None);
        }

        let keys = value
            .pointer("/transaction/transaction/message/accountKeys")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                StreamError::malformed("missing transaction.transaction.message.accountKeys")
            })?;

        let accounts: Vec<String> = keys
            .iter()
            .map(account_key)
            .collect::<Option<_>>()
            .ok_or_else(|| StreamError::malformed("account key without pubkey"))?;

        let mint_address = accounts
            .get(self.config.mint_account_index)
            .cloned()
            .ok_or_else(|| {
                StreamError::malformed(format!(
                    "expected mint at account index {}, frame has {} keys",
                    self.config.mint_account_index,
                    accounts.len()
                ))
            })?;

        let signature = value
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::malformed("missing signature"))?
            .to_string();

        Ok(Some(TokenEvent {
            mint_address,
            involved_accounts: accounts,
            signature,
            observed_at,
        }))
    }
}

/// jsonParsed encoding gives `{ "pubkey": .. }` objects, the others bare strings.
fn account_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("pubkey")?.as_str().map(String::from),
        _ => None,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

//! Delivery of notices to subscribers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use mintwatch_core::{DeliveryError, SubscriberId, SubscriptionId, TokenInfo};

/// What a subscriber is told.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// The one notification a subscription exists for.
    NewToken {
        subscriber: SubscriberId,
        subscription: SubscriptionId,
        mint: String,
        signature: String,
        age_secs: u64,
        info: TokenInfo,
    },
    /// Follow-up: the watch ended, start a new one to keep watching.
    MonitoringStopped {
        subscriber: SubscriberId,
        subscription: SubscriptionId,
    },
}

/// A delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<(), DeliveryError>;
}

/// In-process delivery over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Create the notifier and the receiving end notices arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn deliver(&self, notice: &Notice) -> Result<(), DeliveryError> {
        self.tx
            .send(notice.clone())
            .map_err(|_| DeliveryError::ChannelClosed)
    }
}

/// POSTs each notice as JSON to a fixed URL.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self { url: url.into(), http }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notice: &Notice) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }
        Ok(())
    }
}

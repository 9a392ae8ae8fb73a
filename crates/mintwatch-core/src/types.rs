//! Domain types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Program id of the pump.fun bonding-curve program, watched by default.
pub const PUMP_FUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Identifies whoever receives notifications (e.g. a chat user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub String);

impl From<String> for SubscriberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for SubscriberId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique id of one subscription lifetime.
///
/// A subscriber that re-subscribes gets a new id, so a task left over from
/// the previous subscription can never retire its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Waiting for the next qualifying event.
    Active,
    /// Delivered, cancelled or replaced. Never reactivated.
    Retired,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

/// A subscriber's standing request to be told about the next new mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscriber_id: SubscriberId,
    pub program_id: String,
    pub state: SubscriptionState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retired_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// A fresh `Active` subscription created now.
    pub fn new(id: SubscriptionId, subscriber_id: SubscriberId, program_id: impl Into<String>) -> Self {
        Self {
            id,
            subscriber_id,
            program_id: program_id.into(),
            state: SubscriptionState::Active,
            created_at: Utc::now(),
            retired_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Active
    }

    /// Move to `Retired`. Returns `false` if it already was.
    pub fn retire(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = SubscriptionState::Retired;
        self.retired_at = Some(Utc::now());
        true
    }
}

/// A newly initialized token mint seen on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub mint_address: String,
    /// Account keys of the transaction, in instruction order.
    pub involved_accounts: Vec<String>,
    pub signature: String,
    pub observed_at: DateTime<Utc>,
}

impl TokenEvent {
    /// Whole seconds between observation and `now`, never negative.
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.observed_at).num_seconds().max(0) as u64
    }
}

/// Social links attached to a token's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Socials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Display data for a token, as returned by enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub liquidity: f64,
    pub market_cap: f64,
    pub socials: Socials,
}

impl TokenInfo {
    /// Placeholder used when enrichment fails or has nothing to say.
    pub fn unknown(mint: impl Into<String>) -> Self {
        Self {
            mint: mint.into(),
            name: "Unknown".into(),
            symbol: "?".into(),
            price: 0.0,
            liquidity: 0.0,
            market_cap: 0.0,
            socials: Socials::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn retire_is_one_way() {
        let mut sub = Subscription::new(SubscriptionId(1), "42".into(), PUMP_FUN_PROGRAM);
        assert!(sub.is_active());
        assert!(sub.retire());
        assert_eq!(sub.state, SubscriptionState::Retired);
        assert!(sub.retired_at.is_some());
        assert!(!sub.retire());
    }

    #[test]
    fn event_age_is_clamped() {
        let now = Utc::now();
        let event = TokenEvent {
            mint_address: "MintAddrXYZ".into(),
            involved_accounts: vec![],
            signature: "sig".into(),
            observed_at: now - Duration::seconds(7),
        };
        assert_eq!(event.age_secs(now), 7);
        assert_eq!(event.age_secs(now - Duration::seconds(60)), 0);
    }

    #[test]
    fn subscriber_id_from_numeric_chat_id() {
        assert_eq!(SubscriberId::from(123_456_789i64).to_string(), "123456789");
    }
}

//! mintwatch-engine — from subscription to notice.
//!
//! # Overview
//!
//! [`SubscriptionRegistry`] owns the set of subscriptions and spawns one
//! monitor task per Active subscription. The task drives a
//! `StreamConnection`, filters repeats through the shared `DedupCache`, and
//! hands the first fresh mint to [`NotificationDispatcher`], which claims
//! the subscription, enriches the token and delivers the notice.
//!
//! ```text
//! start_watch ─► monitor task ─► StreamConnection::next_event
//!                     │
//!                     ├─ DedupCache::seen_before ─► (duplicate: keep going)
//!                     └─ NotificationDispatcher::dispatch
//!                            claim ─► Enricher ─► Notifier
//! ```

pub mod config;
pub mod dispatcher;
pub mod enrich;
pub mod monitor;
pub mod notifier;
pub mod registry;

pub use config::{EngineConfig, EnrichConfig};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, SubscriptionClaim};
pub use enrich::{check_rpc, Enricher, NoopEnricher, RpcEnricher, RpcHealth};
pub use monitor::{run_monitor, MonitorContext};
pub use notifier::{ChannelNotifier, Notice, Notifier, WebhookNotifier};
pub use registry::SubscriptionRegistry;

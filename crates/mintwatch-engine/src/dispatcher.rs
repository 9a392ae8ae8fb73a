//! `NotificationDispatcher` — claim, enrich, deliver.
//!
//! The subscription is claimed (Active → Retired) before anything is sent,
//! so a subscriber that stopped or re-subscribed in the meantime never gets
//! a stale notice, and a failed delivery is not retried.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use mintwatch_core::{EnrichmentError, Subscription, TokenEvent, TokenInfo};
use mintwatch_observability::PipelineMetrics;

use crate::enrich::Enricher;
use crate::notifier::{Notice, Notifier};

/// Atomically retires a subscription if it is still the live one.
pub trait SubscriptionClaim: Send + Sync {
    /// `true` exactly once per subscription, and only while it is Active.
    fn claim(&self, subscription: &Subscription) -> bool;
}

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// Claimed but the `NewToken` notice could not be delivered.
    DeliveryFailed,
    /// Subscription was no longer Active; nothing was sent.
    Superseded,
}

pub struct NotificationDispatcher {
    enricher: Arc<dyn Enricher>,
    notifier: Arc<dyn Notifier>,
    enrich_timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl NotificationDispatcher {
    pub fn new(enricher: Arc<dyn Enricher>, notifier: Arc<dyn Notifier>, enrich_timeout: Duration) -> Self {
        Self {
            enricher,
            notifier,
            enrich_timeout,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn dispatch(
        &self,
        event: &TokenEvent,
        subscription: &Subscription,
        claim: &dyn SubscriptionClaim,
    ) -> DispatchOutcome {
        if !claim.claim(subscription) {
            debug!(mint = %event.mint_address, "subscription no longer active, dropping event");
            return DispatchOutcome::Superseded;
        }

        let info = self.enrich(&event.mint_address).await;
        let notice = Notice::NewToken {
            subscriber: subscription.subscriber_id.clone(),
            subscription: subscription.id,
            mint: event.mint_address.clone(),
            signature: event.signature.clone(),
            age_secs: event.age_secs(Utc::now()),
            info,
        };

        if let Err(e) = self.notifier.deliver(&notice).await {
            self.metrics.record_delivery_failure();
            error!(mint = %event.mint_address, error = %e, "failed to deliver token notice");
            return DispatchOutcome::DeliveryFailed;
        }
        self.metrics.record_delivered();
        info!(mint = %event.mint_address, signature = %event.signature, "token notice delivered");

        let stopped = Notice::MonitoringStopped {
            subscriber: subscription.subscriber_id.clone(),
            subscription: subscription.id,
        };
        if let Err(e) = self.notifier.deliver(&stopped).await {
            warn!(error = %e, "failed to deliver monitoring-stopped notice");
        }
        DispatchOutcome::Delivered
    }

    /// Enrichment bounded by the timeout; any failure degrades to defaults.
    async fn enrich(&self, mint: &str) -> TokenInfo {
        match self.lookup(mint).await {
            Ok(info) => info,
            Err(e) => {
                self.metrics.record_enrichment_failure();
                warn!(mint, error = %e, "enrichment failed, sending defaults");
                TokenInfo::unknown(mint)
            }
        }
    }

    async fn lookup(&self, mint: &str) -> Result<TokenInfo, EnrichmentError> {
        tokio::time::timeout(self.enrich_timeout, self.enricher.enrich(mint))
            .await
            .unwrap_or_else(|_| {
                Err(EnrichmentError::Timeout {
                    ms: self.enrich_timeout.as_millis() as u64,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChannelNotifier;
    use async_trait::async_trait;
    use mintwatch_core::{DeliveryError, SubscriptionId};
    use std::sync::Mutex;

    /// Claims each subscription id once.
    #[derive(Default)]
    struct OnceClaim(Mutex<Vec<SubscriptionId>>);

    impl SubscriptionClaim for OnceClaim {
        fn claim(&self, subscription: &Subscription) -> bool {
            let mut claimed = self.0.lock().unwrap();
            if claimed.contains(&subscription.id) {
                return false;
            }
            claimed.push(subscription.id);
            true
        }
    }

    struct FixedEnricher;

    #[async_trait]
    impl Enricher for FixedEnricher {
        async fn enrich(&self, mint: &str) -> Result<TokenInfo, EnrichmentError> {
            let mut info = TokenInfo::unknown(mint);
            info.name = "Dog Coin".into();
            info.symbol = "DOG".into();
            Ok(info)
        }
    }

    struct FailingEnricher;

    #[async_trait]
    impl Enricher for FailingEnricher {
        async fn enrich(&self, mint: &str) -> Result<TokenInfo, EnrichmentError> {
            Err(EnrichmentError::NotFound { mint: mint.into() })
        }
    }

    struct SlowEnricher;

    #[async_trait]
    impl Enricher for SlowEnricher {
        async fn enrich(&self, mint: &str) -> Result<TokenInfo, EnrichmentError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TokenInfo::unknown(mint))
        }
    }

    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn deliver(&self, _notice: &Notice) -> Result<(), DeliveryError> {
            Err(DeliveryError::Http("connection refused".into()))
        }
    }

    fn event(mint: &str) -> TokenEvent {
        TokenEvent {
            mint_address: mint.into(),
            involved_accounts: vec!["prog".into(), mint.into()],
            signature: "sig-1".into(),
            observed_at: Utc::now(),
        }
    }

    fn subscription() -> Subscription {
        Subscription::new(SubscriptionId(1), "42".into(), "prog")
    }

    #[tokio::test]
    async fn delivers_token_then_stopped_notice() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let metrics = Arc::new(PipelineMetrics::new());
        let dispatcher = NotificationDispatcher::new(Arc::new(FixedEnricher), Arc::new(notifier), Duration::from_secs(10))
            .with_metrics(Arc::clone(&metrics));

        let outcome = dispatcher.dispatch(&event("MintAddrXYZ"), &subscription(), &OnceClaim::default()).await;

        assert_eq!(outcome, DispatchOutcome::Delivered);
        match rx.recv().await.unwrap() {
            Notice::NewToken { mint, info, age_secs, .. } => {
                assert_eq!(mint, "MintAddrXYZ");
                assert_eq!(info.symbol, "DOG");
                assert!(age_secs < 5);
            }
            other => panic!("unexpected notice: {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), Notice::MonitoringStopped { .. }));
        assert_eq!(metrics.snapshot().notifications_delivered, 1);
    }

    #[tokio::test]
    async fn second_dispatch_for_same_subscription_is_superseded() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let dispatcher = NotificationDispatcher::new(Arc::new(FixedEnricher), Arc::new(notifier), Duration::from_secs(10));
        let claim = OnceClaim::default();
        let sub = subscription();

        assert_eq!(dispatcher.dispatch(&event("A"), &sub, &claim).await, DispatchOutcome::Delivered);
        assert_eq!(dispatcher.dispatch(&event("B"), &sub, &claim).await, DispatchOutcome::Superseded);

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn enrichment_failure_degrades_to_defaults() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let metrics = Arc::new(PipelineMetrics::new());
        let dispatcher = NotificationDispatcher::new(Arc::new(FailingEnricher), Arc::new(notifier), Duration::from_secs(10))
            .with_metrics(Arc::clone(&metrics));

        dispatcher.dispatch(&event("MintAddrXYZ"), &subscription(), &OnceClaim::default()).await;

        let Notice::NewToken { info, .. } = rx.recv().await.unwrap() else {
            panic!("expected a token notice");
        };
        assert_eq!(info, TokenInfo::unknown("MintAddrXYZ"));
        assert_eq!(metrics.snapshot().enrichment_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_enrichment_times_out() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let dispatcher = NotificationDispatcher::new(Arc::new(SlowEnricher), Arc::new(notifier), Duration::from_secs(10));

        let start = tokio::time::Instant::now();
        dispatcher.dispatch(&event("MintAddrXYZ"), &subscription(), &OnceClaim::default()).await;

        assert!(start.elapsed() < Duration::from_secs(11));
        let Notice::NewToken { info, .. } = rx.recv().await.unwrap() else {
            panic!("expected a token notice");
        };
        assert_eq!(info.name, "Unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_reports_timeout_error() {
        let (notifier, _rx) = ChannelNotifier::channel();
        let dispatcher = NotificationDispatcher::new(Arc::new(SlowEnricher), Arc::new(notifier), Duration::from_millis(2500));

        let err = dispatcher.lookup("MintAddrXYZ").await.unwrap_err();

        assert!(matches!(err, EnrichmentError::Timeout { ms: 2500 }));
    }

    #[tokio::test]
    async fn delivery_failure_still_claims() {
        let metrics = Arc::new(PipelineMetrics::new());
        let dispatcher = NotificationDispatcher::new(Arc::new(FixedEnricher), Arc::new(BrokenNotifier), Duration::from_secs(10))
            .with_metrics(Arc::clone(&metrics));
        let claim = OnceClaim::default();
        let sub = subscription();

        assert_eq!(dispatcher.dispatch(&event("A"), &sub, &claim).await, DispatchOutcome::DeliveryFailed);
        assert_eq!(dispatcher.dispatch(&event("A"), &sub, &claim).await, DispatchOutcome::Superseded);
        assert_eq!(metrics.snapshot().delivery_failures, 1);
    }
}

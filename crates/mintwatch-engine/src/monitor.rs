//! Per-subscription monitor task.
//!
//! Each Active subscription runs one task that owns one
//! `StreamConnection`: receive → dedup → dispatch, then close.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use mintwatch_core::{DedupCache, Subscription};
use mintwatch_observability::PipelineMetrics;
use mintwatch_ws::{Connector, StreamConfig, StreamConnection};

use crate::config::EngineConfig;
use crate::dispatcher::{DispatchOutcome, NotificationDispatcher, SubscriptionClaim};
use crate::enrich::Enricher;
use crate::notifier::Notifier;

/// Everything a monitor task needs, shared by all of them.
#[derive(Clone)]
pub struct MonitorContext {
    pub stream_config: Arc<StreamConfig>,
    pub connector: Arc<dyn Connector>,
    pub dedup: Arc<DedupCache>,
    /// How often the registry purges `dedup`; `None` leaves it to lazy expiry.
    pub sweep_interval: Option<Duration>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub metrics: Arc<PipelineMetrics>,
}

impl MonitorContext {
    pub fn new(
        engine: &EngineConfig,
        stream_config: StreamConfig,
        connector: Arc<dyn Connector>,
        enricher: Arc<dyn Enricher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let dispatcher = NotificationDispatcher::new(enricher, notifier, engine.enrich_timeout())
            .with_metrics(Arc::clone(&metrics));
        Self {
            stream_config: Arc::new(stream_config),
            connector,
            dedup: Arc::new(DedupCache::new(engine.dedup_ttl())),
            sweep_interval: engine.sweep_interval(),
            dispatcher: Arc::new(dispatcher),
            metrics,
        }
    }
}

/// Watch for the first fresh mint and hand it to the dispatcher.
///
/// Returns once an event was dispatched (whatever the outcome), stop was
/// signalled, or the stream failed for good. In the last case the
/// subscription is retired. The connection is closed on every exit path.
pub async fn run_monitor(
    ctx: MonitorContext,
    subscription: Subscription,
    claim: Arc<dyn SubscriptionClaim>,
    stop: watch::Receiver<bool>,
) -> Option<DispatchOutcome> {
    let mut conn = StreamConnection::new(
        subscription.program_id.clone(),
        Arc::clone(&ctx.stream_config),
        Arc::clone(&ctx.connector),
        stop,
    )
    .with_metrics(Arc::clone(&ctx.metrics));

    info!(program = %subscription.program_id, "monitoring started");

    let mut outcome = None;
    while let Some(event) = conn.next_event().await {
        if conn.is_stopped() {
            break;
        }
        if ctx.dedup.seen_before(&event.mint_address) {
            ctx.metrics.record_duplicate();
            debug!(mint = %event.mint_address, "duplicate mint suppressed");
            continue;
        }
        outcome = Some(ctx.dispatcher.dispatch(&event, &subscription, claim.as_ref()).await);
        break;
    }

    if outcome.is_none() && !conn.is_stopped() && claim.claim(&subscription) {
        warn!("stream cannot be reopened, subscription retired");
    }

    conn.close().await;
    info!(outcome = ?outcome, "monitoring ended");
    outcome
}

//! `mintwatch watch` — wait for the next new token mint on a live endpoint.
//!
//! Health-checks the HTTP RPC, starts one watch and prints every notice as a
//! JSON line (or posts it to the webhook). Exits when the subscription
//! retires or on Ctrl-C.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use mintwatch_core::SubscriberId;
use mintwatch_engine::{
    check_rpc, ChannelNotifier, DispatchOutcome, Enricher, MonitorContext, NoopEnricher, Notice,
    Notifier, RpcEnricher, SubscriptionRegistry, WebhookNotifier,
};
use mintwatch_observability::init_tracing;
use mintwatch_ws::WsConnector;

use crate::settings::Settings;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(subscriber: &str, settings: Settings, skip_check: bool) -> Result<()> {
    init_tracing(&settings.log);

    if skip_check {
        warn!(url = %settings.http_url, "skipping RPC health check");
    } else {
        let health = check_rpc(&settings.http_url, HEALTH_CHECK_TIMEOUT)
            .await
            .with_context(|| format!("RPC health check failed for {}", settings.http_url))?;
        info!(
            url = %settings.http_url,
            slot = health.slot,
            latency_ms = health.latency.as_millis() as u64,
            "RPC reachable"
        );
    }

    let enricher: Arc<dyn Enricher> = if settings.enrich {
        Arc::new(RpcEnricher::new(settings.enrich_config()))
    } else {
        Arc::new(NoopEnricher)
    };

    let (notifier, notices): (Arc<dyn Notifier>, Option<UnboundedReceiver<Notice>>) =
        match &settings.webhook_url {
            Some(url) => {
                info!(url = %url, "delivering notices to webhook");
                (Arc::new(WebhookNotifier::new(url, WEBHOOK_TIMEOUT)), None)
            }
            None => {
                let (notifier, rx) = ChannelNotifier::channel();
                (Arc::new(notifier), Some(rx))
            }
        };

    let ctx = MonitorContext::new(
        &settings.engine,
        settings.stream.clone(),
        Arc::new(WsConnector),
        enricher,
        notifier,
    );
    let registry = SubscriptionRegistry::new(ctx);
    let printer = notices.map(|rx| tokio::spawn(print_notices(rx)));

    let subscriber = SubscriberId::from(subscriber);
    let subscription = registry.start_watch(subscriber.clone());
    info!(
        subscriber = %subscriber,
        subscription = %subscription.id,
        program = %subscription.program_id,
        "watching for the next new token"
    );

    let outcome = {
        let wait = registry.wait(&subscriber);
        tokio::pin!(wait);
        let finished = tokio::select! {
            outcome = &mut wait => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };
        match finished {
            Some(outcome) => outcome,
            None => {
                info!("interrupted, stopping watch");
                registry.stop_watch(&subscriber);
                wait.await
            }
        }
    };

    registry.shutdown().await;
    let metrics = registry.context().metrics.snapshot();
    drop(registry);
    if let Some(printer) = printer {
        printer.await?;
    }
    info!(?metrics, "pipeline counters");

    match outcome {
        Some(DispatchOutcome::Delivered) => Ok(()),
        Some(DispatchOutcome::DeliveryFailed) => bail!("the token notice could not be delivered"),
        Some(DispatchOutcome::Superseded) | None => {
            info!("watch ended without a notice");
            Ok(())
        }
    }
}

/// Print notices as JSON lines until every sender is gone.
pub async fn print_notices(mut rx: UnboundedReceiver<Notice>) {
    while let Some(notice) = rx.recv().await {
        match serde_json::to_string(&notice) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "could not encode notice"),
        }
    }
}

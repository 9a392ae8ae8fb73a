//! `mintwatch replay` — run recorded frames through the full pipeline.
//!
//! Each non-empty line of the file is one frame as received from the node.
//! Frames are pushed into a scripted session followed by a close; the watch
//! either delivers a notice or, once the script has nothing left to connect
//! to, is stopped.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use mintwatch_core::SubscriberId;
use mintwatch_engine::{
    ChannelNotifier, EngineConfig, MonitorContext, NoopEnricher, SubscriptionRegistry,
};
use mintwatch_observability::{init_tracing, LogConfig};
use mintwatch_ws::{MockConnector, StreamConfig};

use crate::cmd_watch::print_notices;

pub async fn run(file: &Path, subscriber: &str, program: Option<&str>, json_logs: bool) -> Result<()> {
    init_tracing(&LogConfig {
        level: "warn".into(),
        json: json_logs,
        ..Default::default()
    });

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("read frames file '{}'", file.display()))?;
    let frames: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let mock = MockConnector::new();
    let session = mock.open_session();
    for frame in &frames {
        session.send_frame(*frame);
    }
    session.close();

    let mut stream = StreamConfig::for_url("mock://replay");
    stream.reconnect_delay_ms = 10;
    if let Some(program) = program {
        stream.program_id = program.to_string();
    }
    let (notifier, notices) = ChannelNotifier::channel();
    let ctx = MonitorContext::new(
        &EngineConfig::default(),
        stream,
        Arc::new(mock.clone()),
        Arc::new(NoopEnricher),
        Arc::new(notifier),
    );
    let metrics = Arc::clone(&ctx.metrics);
    let registry = SubscriptionRegistry::new(ctx);
    let printer = tokio::spawn(print_notices(notices));

    let subscriber = SubscriberId::from(subscriber);
    registry.start_watch(subscriber.clone());

    let outcome = {
        let wait = registry.wait(&subscriber);
        tokio::pin!(wait);
        let finished = tokio::select! {
            outcome = &mut wait => Some(outcome),
            _ = mock.exhausted() => None,
        };
        match finished {
            Some(outcome) => outcome,
            None => {
                registry.stop_watch(&subscriber);
                wait.await
            }
        }
    };

    registry.shutdown().await;
    drop(registry);
    printer.await?;

    let snapshot = metrics.snapshot();
    println!();
    println!("Replayed {} frame(s) from {}", frames.len(), file.display());
    println!("  Frames received:   {}", snapshot.frames_received);
    println!("  Malformed frames:  {}", snapshot.malformed_frames);
    println!("  Events detected:   {}", snapshot.events_detected);
    println!("  Duplicates:        {}", snapshot.duplicates_suppressed);
    println!("  Notices delivered: {}", snapshot.notifications_delivered);
    println!("  Outcome:           {}", outcome.map_or("no notice".to_string(), |o| format!("{o:?}")));
    Ok(())
}

//! `SubscriptionRegistry` — who is watching, and the task doing it.
//!
//! At most one Active subscription per subscriber. Every operation takes the
//! registry lock briefly and never across an await; monitor tasks are
//! spawned and signalled while it is held so a concurrent `start_watch` /
//! `stop_watch` pair can never leave an orphaned Active task behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use mintwatch_core::{SubscriberId, Subscription, SubscriptionId, SubscriptionState};

use crate::dispatcher::{DispatchOutcome, SubscriptionClaim};
use crate::monitor::{run_monitor, MonitorContext};

type MonitorHandle = JoinHandle<Option<DispatchOutcome>>;

struct Entry {
    subscription: Subscription,
    stop: watch::Sender<bool>,
    task: Option<MonitorHandle>,
}

pub struct SubscriptionRegistry {
    ctx: MonitorContext,
    entries: Mutex<HashMap<SubscriberId, Entry>>,
    /// Tasks of replaced subscriptions, still winding down.
    replaced: Mutex<Vec<MonitorHandle>>,
    next_id: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionRegistry {
    pub fn new(ctx: MonitorContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            entries: Mutex::new(HashMap::new()),
            replaced: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    /// Start the dedup sweeper on first use; it runs until
    /// [`shutdown`](Self::shutdown).
    fn ensure_sweeper(&self) {
        let Some(interval) = self.ctx.sweep_interval else {
            return;
        };
        let mut sweeper = self.sweeper.lock().unwrap();
        if sweeper.is_none() {
            *sweeper = Some(self.ctx.dedup.spawn_sweeper(interval));
            debug!(interval_secs = interval.as_secs(), "dedup sweeper started");
        }
    }

    /// Start watching for `subscriber`, replacing any existing subscription.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_watch(self: &Arc<Self>, subscriber: impl Into<SubscriberId>) -> Subscription {
        self.ensure_sweeper();
        let subscriber = subscriber.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let subscription = Subscription::new(
            id,
            subscriber.clone(),
            self.ctx.stream_config.program_id.clone(),
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let claim: Arc<dyn SubscriptionClaim> = self.clone();

        let mut entries = self.entries.lock().unwrap();
        if let Some(mut old) = entries.remove(&subscriber) {
            old.subscription.retire();
            let _ = old.stop.send(true);
            info!(subscriber = %subscriber, old = %old.subscription.id, new = %id, "replacing subscription");
            if let Some(task) = old.task.take() {
                let mut replaced = self.replaced.lock().unwrap();
                replaced.retain(|t| !t.is_finished());
                replaced.push(task);
            }
        }

        let span = info_span!("monitor", subscriber = %subscriber, subscription = %id);
        let task = tokio::spawn(
            run_monitor(self.ctx.clone(), subscription.clone(), claim, stop_rx).instrument(span),
        );
        entries.insert(
            subscriber.clone(),
            Entry {
                subscription: subscription.clone(),
                stop: stop_tx,
                task: Some(task),
            },
        );
        info!(subscriber = %subscriber, subscription = %id, "watch started");
        subscription
    }

    /// Retire the subscriber's subscription and stop its connection.
    ///
    /// Returns `false` if there was no Active subscription.
    pub fn stop_watch(&self, subscriber: &SubscriberId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(subscriber) else {
            return false;
        };
        let was_active = entry.subscription.retire();
        let _ = entry.stop.send(true);
        if was_active {
            info!(subscriber = %subscriber, subscription = %entry.subscription.id, "watch stopped");
        }
        was_active
    }

    pub fn status(&self, subscriber: &SubscriberId) -> Option<SubscriptionState> {
        self.entries
            .lock()
            .unwrap()
            .get(subscriber)
            .map(|e| e.subscription.state)
    }

    /// Copy of the subscriber's current (or last) subscription.
    pub fn subscription(&self, subscriber: &SubscriberId) -> Option<Subscription> {
        self.entries
            .lock()
            .unwrap()
            .get(subscriber)
            .map(|e| e.subscription.clone())
    }

    pub fn count_active(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.subscription.is_active())
            .count()
    }

    /// Wait for the subscriber's monitor task to finish.
    ///
    /// `None` if there is no task to wait for (unknown subscriber, already
    /// awaited) or the task was stopped before dispatching anything.
    pub async fn wait(&self, subscriber: &SubscriberId) -> Option<DispatchOutcome> {
        let task = self
            .entries
            .lock()
            .unwrap()
            .get_mut(subscriber)
            .and_then(|e| e.task.take())?;
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(subscriber = %subscriber, error = %e, "monitor task failed");
                None
            }
        }
    }

    /// Stop every subscription and wait for all monitor tasks to end.
    pub async fn shutdown(&self) {
        let mut tasks = Vec::new();
        {
            let mut entries = self.entries.lock().unwrap();
            for entry in entries.values_mut() {
                entry.subscription.retire();
                let _ = entry.stop.send(true);
                tasks.extend(entry.task.take());
            }
        }
        tasks.extend(self.replaced.lock().unwrap().drain(..));
        if let Some(sweeper) = self.sweeper.lock().unwrap().take() {
            sweeper.abort();
        }

        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "monitor task failed");
            }
        }
        info!(tasks = count, "registry shut down");
    }
}

impl SubscriptionClaim for SubscriptionRegistry {
    fn claim(&self, subscription: &Subscription) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(&subscription.subscriber_id) else {
            return false;
        };
        if entry.subscription.id != subscription.id || !entry.subscription.retire() {
            debug!(subscription = %subscription.id, "claim lost");
            return false;
        }
        let _ = entry.stop.send(true);
        true
    }
}

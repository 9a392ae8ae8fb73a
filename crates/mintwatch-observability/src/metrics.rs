//! Pipeline counters.
//!
//! One `PipelineMetrics` is shared (behind an `Arc`) by every monitor task.
//! Counters are relaxed atomics; `snapshot()` gives a serializable copy.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    events_detected: AtomicU64,
    duplicates_suppressed: AtomicU64,
    notifications_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    enrichment_failures: AtomicU64,
    connect_failures: AtomicU64,
    reconnections: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub events_detected: u64,
    pub duplicates_suppressed: u64,
    pub notifications_delivered: u64,
    pub delivery_failures: u64,
    pub enrichment_failures: u64,
    pub connect_failures: u64,
    pub reconnections: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enrichment_failure(&self) {
        self.enrichment_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            events_detected: self.events_detected.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            enrichment_failures: self.enrichment_failures.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
        }
    }
}

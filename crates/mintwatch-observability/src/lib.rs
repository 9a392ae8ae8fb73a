//! # mintwatch-observability
//!
//! Structured logging and pipeline counters for mintwatch.
//!
//! ## Counters
//! - `frames_received` / `malformed_frames` — per connection receive path
//! - `events_detected` / `duplicates_suppressed` — extractor + dedup
//! - `notifications_delivered` / `delivery_failures` / `enrichment_failures`
//! - `connect_failures` / `reconnections` — transport health
//!
//! ## Structured logging
//! JSON or human-readable `tracing` output, level configurable per crate.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use tracing_setup::{init_tracing, LogConfig};

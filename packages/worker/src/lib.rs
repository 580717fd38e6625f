//! Document enrichment worker.
//!
//! Pulls batches of document-created events from NATS JetStream, runs them
//! through the [`enrichment`] pipeline, and settles every message with the
//! queue: acknowledged, released for redelivery, or dead-lettered.

pub mod config;
pub mod queue;
pub mod wiring;
pub mod worker;

pub use config::Config;
pub use queue::{JetStreamQueue, JetStreamSettings, MemoryQueue, MessageQueue};
pub use worker::{BatchSummary, BatchWorker, BatchWorkerConfig};

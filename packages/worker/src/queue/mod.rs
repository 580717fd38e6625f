//! Queue substrate the worker pulls batches from.
//!
//! The substrate owns delivery state: it counts receives, hides in-flight
//! messages, and redelivers released ones. The worker only tells it what to
//! do with each message once a batch has been processed.

mod jetstream;
mod memory;

pub use jetstream::{JetStreamQueue, JetStreamSettings};
pub use memory::{DeadLetter, MemoryQueue};

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use enrichment::QueueMessage;

/// Trait for queue operations.
///
/// This allows swapping between JetStream and an in-process queue for tests.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receive up to `max_messages`, waiting at most `wait` for the first.
    ///
    /// Every returned message is in flight until it is acknowledged,
    /// released or dead-lettered.
    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueMessage>>;

    /// Delete a message for good.
    async fn acknowledge(&self, message_id: &str) -> Result<()>;

    /// Make a message visible again for redelivery.
    async fn release(&self, message_id: &str) -> Result<()>;

    /// Move a message to the dead-letter destination.
    async fn dead_letter(&self, message_id: &str, reason: &str) -> Result<()>;
}

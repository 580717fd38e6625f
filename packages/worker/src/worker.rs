//! Batch worker service.
//!
//! The `BatchWorker` is a long-running service that:
//! - Pulls batches from a `MessageQueue`
//! - Processes each batch under an invocation timeout
//! - Acknowledges, releases or dead-letters every message per the redrive policy
//!
//! # Architecture
//!
//! ```text
//! BatchWorker
//!     │
//!     ├─► queue.receive(batch_size)
//!     ├─► processor.process_batch(messages, batch token)
//!     │       └─► timer cancels the batch token after batch_timeout
//!     └─► per message: RedrivePolicy → acknowledge / release / dead_letter
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use enrichment::{BatchOutcome, BatchProcessor, Disposition, QueueMessage, RedrivePolicy};

use crate::queue::MessageQueue;

/// Configuration for the batch worker.
#[derive(Debug, Clone)]
pub struct BatchWorkerConfig {
    /// Maximum number of messages per batch
    pub batch_size: usize,
    /// Budget for processing one batch; in-flight messages are cancelled after it
    pub batch_timeout: Duration,
    /// How long a receive waits for messages
    pub receive_wait: Duration,
    /// How long to sleep when the queue is empty
    pub idle_poll_interval: Duration,
    pub redrive: RedrivePolicy,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for BatchWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_secs(60),
            receive_wait: Duration::from_secs(5),
            idle_poll_interval: Duration::from_secs(1),
            redrive: RedrivePolicy::default(),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

/// What happened to the messages of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub acknowledged: usize,
    pub redelivered: usize,
    pub dead_lettered: usize,
    /// Messages the queue refused to settle; the substrate will redeliver them
    pub settle_errors: usize,
}

impl BatchSummary {
    fn count(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Acknowledge => self.acknowledged += 1,
            Disposition::Redeliver => self.redelivered += 1,
            Disposition::DeadLetter => self.dead_lettered += 1,
        }
    }
}

pub struct BatchWorker {
    queue: Arc<dyn MessageQueue>,
    processor: Arc<BatchProcessor>,
    config: BatchWorkerConfig,
}

impl BatchWorker {
    pub fn new(queue: Arc<dyn MessageQueue>, processor: Arc<BatchProcessor>) -> Self {
        Self {
            queue,
            processor,
            config: BatchWorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BatchWorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BatchWorkerConfig {
        &self.config
    }

    /// Receive, process and settle one batch.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<BatchSummary> {
        let messages = self
            .queue
            .receive(self.config.batch_size, self.config.receive_wait)
            .await
            .context("failed to receive batch")?;
        if messages.is_empty() {
            return Ok(BatchSummary::default());
        }
        debug!(count = messages.len(), "received batch");

        let outcome = self.process_with_timeout(&messages, shutdown).await;
        let summary = self.settle(&outcome, &messages).await;

        info!(
            worker_id = %self.config.worker_id,
            received = summary.received,
            acknowledged = summary.acknowledged,
            redelivered = summary.redelivered,
            dead_lettered = summary.dead_lettered,
            settle_errors = summary.settle_errors,
            "batch settled"
        );
        Ok(summary)
    }

    async fn process_with_timeout(
        &self,
        messages: &[QueueMessage],
        shutdown: &CancellationToken,
    ) -> BatchOutcome {
        let batch_cancel = shutdown.child_token();

        let timer_cancel = batch_cancel.clone();
        let batch_timeout = self.config.batch_timeout;
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = timer_cancel.cancelled() => {}
                _ = tokio::time::sleep(batch_timeout) => {
                    warn!(timeout_ms = batch_timeout.as_millis() as u64, "batch timed out, cancelling in-flight messages");
                    timer_cancel.cancel();
                }
            }
        });

        let outcome = self.processor.process_batch(messages, &batch_cancel).await;

        // Stop the timer
        batch_cancel.cancel();
        let _ = timer.await;

        outcome
    }

    async fn settle(&self, outcome: &BatchOutcome, messages: &[QueueMessage]) -> BatchSummary {
        let mut summary = BatchSummary {
            received: messages.len(),
            ..Default::default()
        };

        for (message, disposition) in self.config.redrive.dispositions(outcome, messages) {
            let settled = match disposition {
                Disposition::Acknowledge => self.queue.acknowledge(&message.id).await,
                Disposition::Redeliver => self.queue.release(&message.id).await,
                Disposition::DeadLetter => {
                    let reason = outcome
                        .get(&message.id)
                        .and_then(|o| o.failure())
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "no outcome recorded".to_string());
                    warn!(
                        message_id = %message.id,
                        receive_count = message.receive_count,
                        reason = %reason,
                        "dead-lettering message"
                    );
                    self.queue.dead_letter(&message.id, &reason).await
                }
            };

            match settled {
                Ok(()) => summary.count(disposition),
                Err(e) => {
                    error!(
                        message_id = %message.id,
                        disposition = ?disposition,
                        error = %e,
                        "failed to settle message"
                    );
                    summary.settle_errors += 1;
                }
            }
        }

        summary
    }

    /// Poll and process batches until `shutdown` is cancelled.
    ///
    /// Shutdown cancels the batch in flight; its unfinished messages are
    /// released for redelivery.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            max_receive_count = self.config.redrive.max_receive_count,
            "batch worker starting"
        );

        loop {
            // Check for shutdown
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_once(&shutdown).await {
                Ok(summary) if summary.received == 0 => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "failed to process batch");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "batch worker stopped");
        Ok(())
    }
}

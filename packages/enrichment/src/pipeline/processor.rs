//! Batch processor: isolates every message of a batch from the others.

use futures::{stream, FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{panic_message, RecordHandler};
use crate::context::InvocationContext;
use crate::error::RecordFailure;
use crate::types::message::QueueMessage;
use crate::types::outcome::{BatchOutcome, RecordOutcome};

/// Configuration for the batch processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum number of messages processed at once within a batch
    pub max_concurrency: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { max_concurrency: 10 }
    }
}

impl ProcessorConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Processes a batch of queue messages and reports an outcome per message.
///
/// No error or panic escapes [`BatchProcessor::process_batch`]: a poisoned
/// message fails alone and every other message carries on.
pub struct BatchProcessor {
    handler: Arc<RecordHandler>,
    config: ProcessorConfig,
}

impl BatchProcessor {
    pub fn new(handler: Arc<RecordHandler>) -> Self {
        Self {
            handler,
            config: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handler(&self) -> &Arc<RecordHandler> {
        &self.handler
    }

    /// Process every message of a batch.
    ///
    /// Messages fan out up to `max_concurrency` at a time. Cancelling `cancel`
    /// cancels every in-flight message, and those report failure. The
    /// returned outcome lists messages in delivery order.
    pub async fn process_batch(
        &self,
        messages: &[QueueMessage],
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let batch_size = messages.len();
        debug!(batch_size, "processing batch");

        let mut outcomes: Vec<(usize, RecordOutcome)> = stream::iter(0..batch_size)
            .map(|index| async move {
                let message = &messages[index];
                let ctx = InvocationContext::for_message(message, cancel);
                (index, self.process_message(&ctx, message).await)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut batch = BatchOutcome::new();
        for (index, outcome) in outcomes {
            let message = &messages[index];
            if let Some(failure) = outcome.failure() {
                warn!(
                    message_id = %message.id,
                    receive_count = message.receive_count,
                    retryable = failure.is_retryable(),
                    error = %failure,
                    "failed to process record"
                );
            }
            batch.record(message.id.clone(), outcome);
        }

        info!(
            batch_size,
            succeeded = batch.success_count(),
            failed = batch.failure_count(),
            stage_failures = batch.stage_failure_count(),
            "batch processed"
        );
        batch
    }

    async fn process_message(&self, ctx: &InvocationContext, message: &QueueMessage) -> RecordOutcome {
        // The handler already isolates stage panics; this also covers decoding.
        match AssertUnwindSafe(self.handler.handle_message(ctx, message))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let panic_msg = panic_message(&panic);
                error!(message_id = %message.id, panic = %panic_msg, "record processing panicked");
                RecordOutcome::Failed(RecordFailure::Panicked(panic_msg))
            }
        }
    }
}

//! Per-invocation context threaded through every stage call.
//!
//! Carries the correlation keys for logging and the cancellation signal for
//! the current batch. Nothing here is global: each message gets its own
//! context, derived from the batch's token.

use tokio_util::sync::CancellationToken;
use tracing::Span;
use uuid::Uuid;

use crate::types::message::QueueMessage;

#[derive(Debug, Clone)]
pub struct InvocationContext {
    message_id: String,
    correlation_id: String,
    receive_count: u32,
    cancel: CancellationToken,
}

impl InvocationContext {
    /// Create a context with a fresh correlation id.
    pub fn new(message_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            message_id: message_id.into(),
            correlation_id: Uuid::new_v4().to_string(),
            receive_count: 1,
            cancel,
        }
    }

    /// Context for one message of a batch.
    ///
    /// The message token is a child of the batch token: cancelling the batch
    /// cancels every in-flight message.
    pub fn for_message(message: &QueueMessage, batch: &CancellationToken) -> Self {
        let mut ctx = Self::new(message.id.clone(), batch.child_token())
            .with_receive_count(message.receive_count);
        if let Some(correlation_id) = &message.correlation_id {
            ctx.correlation_id = correlation_id.clone();
        }
        ctx
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_receive_count(mut self, receive_count: u32) -> Self {
        self.receive_count = receive_count;
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn receive_count(&self) -> u32 {
        self.receive_count
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the invocation is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Span carrying the correlation keys for this record.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "record",
            message_id = %self.message_id,
            correlation_id = %self.correlation_id,
            receive_count = self.receive_count,
        )
    }
}

//! Queue delivery unit.

use bytes::Bytes;

/// One message as delivered by the queue substrate.
///
/// Owned by the queue; the batch processor only borrows it for one
/// processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Identifier the substrate uses to acknowledge or release the message
    pub id: String,

    /// Raw body, expected to be a notification envelope
    pub body: Bytes,

    /// How many times the substrate has delivered this message (1 on first delivery)
    pub receive_count: u32,

    /// Correlation id carried by the substrate, if any
    pub correlation_id: Option<String>,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            receive_count: 1,
            correlation_id: None,
        }
    }

    pub fn with_receive_count(mut self, receive_count: u32) -> Self {
        self.receive_count = receive_count;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

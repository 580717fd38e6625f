//! Redelivery and dead-letter contract between the batch layer and the queue.
//!
//! Nothing in this crate counts receives: the queue substrate does. The
//! policy only turns a message's outcome and receive count into what the
//! substrate should do with it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::message::QueueMessage;
use crate::types::outcome::{BatchOutcome, RecordOutcome};

/// Receives after which a failing message goes to the dead-letter queue.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 3;

/// What the queue substrate should do with a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Delete the message; it must never be processed again
    Acknowledge,
    /// Leave the message for redelivery
    Redeliver,
    /// Stop redelivering and park the message for manual inspection
    DeadLetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedrivePolicy {
    pub max_receive_count: u32,
}

impl Default for RedrivePolicy {
    fn default() -> Self {
        Self {
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
        }
    }
}

impl RedrivePolicy {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            max_receive_count: max_receive_count.max(1),
        }
    }

    pub fn disposition(&self, outcome: &RecordOutcome, receive_count: u32) -> Disposition {
        if outcome.is_success() {
            Disposition::Acknowledge
        } else if receive_count >= self.max_receive_count {
            Disposition::DeadLetter
        } else {
            Disposition::Redeliver
        }
    }

    /// Disposition for every distinct message of a batch, in delivery order.
    ///
    /// A message with no recorded outcome is treated as failed.
    pub fn dispositions<'a>(
        &self,
        outcome: &BatchOutcome,
        messages: &'a [QueueMessage],
    ) -> Vec<(&'a QueueMessage, Disposition)> {
        let mut seen = HashSet::new();
        messages
            .iter()
            .filter(|message| seen.insert(message.id.as_str()))
            .map(|message| {
                let disposition = match outcome.get(&message.id) {
                    Some(record) => self.disposition(record, message.receive_count),
                    None if message.receive_count >= self.max_receive_count => {
                        Disposition::DeadLetter
                    }
                    None => Disposition::Redeliver,
                };
                (message, disposition)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordFailure;
    use crate::types::outcome::PipelineResult;

    fn failed() -> RecordOutcome {
        RecordOutcome::Failed(RecordFailure::Cancelled)
    }

    #[test]
    fn test_success_is_acknowledged_on_any_receive() {
        let policy = RedrivePolicy::default();
        let ok = RecordOutcome::Completed(PipelineResult::new("d1"));
        assert_eq!(policy.disposition(&ok, 1), Disposition::Acknowledge);
        assert_eq!(policy.disposition(&ok, 7), Disposition::Acknowledge);
    }

    #[test]
    fn test_failure_redelivers_until_threshold() {
        let policy = RedrivePolicy::default();
        assert_eq!(policy.disposition(&failed(), 1), Disposition::Redeliver);
        assert_eq!(policy.disposition(&failed(), 2), Disposition::Redeliver);
        assert_eq!(policy.disposition(&failed(), 3), Disposition::DeadLetter);
        assert_eq!(policy.disposition(&failed(), 4), Disposition::DeadLetter);
    }

    #[test]
    fn test_minimum_threshold_is_one() {
        let policy = RedrivePolicy::new(0);
        assert_eq!(policy.max_receive_count, 1);
        assert_eq!(policy.disposition(&failed(), 1), Disposition::DeadLetter);
    }

    #[test]
    fn test_batch_dispositions() {
        let messages = vec![
            QueueMessage::new("m1", "{}"),
            QueueMessage::new("m2", "{}").with_receive_count(3),
            QueueMessage::new("m3", "{}").with_receive_count(2),
            QueueMessage::new("m1", "{}"),
            QueueMessage::new("m4", "{}"),
        ];
        let mut outcome = BatchOutcome::new();
        outcome.record("m1", RecordOutcome::Completed(PipelineResult::new("d1")));
        outcome.record("m2", failed());
        outcome.record("m3", failed());

        let dispositions: Vec<_> = RedrivePolicy::default()
            .dispositions(&outcome, &messages)
            .into_iter()
            .map(|(m, d)| (m.id.as_str(), d))
            .collect();

        assert_eq!(
            dispositions,
            vec![
                ("m1", Disposition::Acknowledge),
                ("m2", Disposition::DeadLetter),
                ("m3", Disposition::Redeliver),
                ("m4", Disposition::Redeliver),
            ]
        );
    }
}

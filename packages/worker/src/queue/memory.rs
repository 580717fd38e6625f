use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use enrichment::QueueMessage;

use super::MessageQueue;

/// A message parked in the dead-letter list.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: Bytes,
    pub receive_count: u32,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct Stored {
    id: String,
    body: Bytes,
    receive_count: u32,
}

#[derive(Default)]
struct State {
    ready: VecDeque<Stored>,
    in_flight: HashMap<String, Stored>,
    acknowledged: Vec<String>,
    dead_letters: Vec<DeadLetter>,
    next_id: u64,
}

/// In-process queue with at-least-once semantics.
///
/// Released messages go to the back of the queue and their receive count
/// grows on every delivery.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a body, returning its message id.
    pub fn push(&self, body: impl Into<Bytes>) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("msg-{}", state.next_id);
        state.ready.push_back(Stored {
            id: id.clone(),
            body: body.into(),
            receive_count: 0,
        });
        id
    }

    /// Ids acknowledged so far, in order.
    pub fn acknowledged(&self) -> Vec<String> {
        self.state().acknowledged.clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state().dead_letters.clone()
    }

    /// Messages waiting for delivery.
    pub fn pending_count(&self) -> usize {
        self.state().ready.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    fn take_in_flight(&self, message_id: &str) -> Result<(std::sync::MutexGuard<'_, State>, Stored)> {
        let mut state = self.state();
        let stored = state
            .in_flight
            .remove(message_id)
            .ok_or_else(|| anyhow!("message {} is not in flight", message_id))?;
        Ok((state, stored))
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self, max_messages: usize, _wait: Duration) -> Result<Vec<QueueMessage>> {
        let mut state = self.state();
        let mut batch = Vec::new();
        while batch.len() < max_messages {
            let Some(mut stored) = state.ready.pop_front() else {
                break;
            };
            stored.receive_count += 1;
            batch.push(
                QueueMessage::new(stored.id.clone(), stored.body.clone())
                    .with_receive_count(stored.receive_count),
            );
            state.in_flight.insert(stored.id.clone(), stored);
        }
        Ok(batch)
    }

    async fn acknowledge(&self, message_id: &str) -> Result<()> {
        let (mut state, stored) = self.take_in_flight(message_id)?;
        state.acknowledged.push(stored.id);
        Ok(())
    }

    async fn release(&self, message_id: &str) -> Result<()> {
        let (mut state, stored) = self.take_in_flight(message_id)?;
        state.ready.push_back(stored);
        Ok(())
    }

    async fn dead_letter(&self, message_id: &str, reason: &str) -> Result<()> {
        let (mut state, stored) = self.take_in_flight(message_id)?;
        state.dead_letters.push(DeadLetter {
            message_id: stored.id,
            body: stored.body,
            receive_count: stored.receive_count,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_counts_grow_on_redelivery() {
        let queue = MemoryQueue::new();
        let id = queue.push("body");

        let first = queue.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(first[0].receive_count, 1);
        assert_eq!(queue.in_flight_count(), 1);
        assert!(queue.receive(10, Duration::ZERO).await.unwrap().is_empty());

        queue.release(&id).await.unwrap();
        let second = queue.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_settling_removes_from_flight() {
        let queue = MemoryQueue::new();
        let a = queue.push("a");
        let b = queue.push("b");
        queue.receive(10, Duration::ZERO).await.unwrap();

        queue.acknowledge(&a).await.unwrap();
        queue.dead_letter(&b, "thumbnail failed").await.unwrap();

        assert_eq!(queue.acknowledged(), vec![a.clone()]);
        assert_eq!(queue.dead_letters()[0].reason, "thumbnail failed");
        assert_eq!(queue.in_flight_count(), 0);
        assert!(queue.acknowledge(&a).await.is_err());
    }

    #[tokio::test]
    async fn test_receive_respects_max() {
        let queue = MemoryQueue::new();
        for i in 0..5 {
            queue.push(format!("m{i}"));
        }
        assert_eq!(queue.receive(2, Duration::ZERO).await.unwrap().len(), 2);
        assert_eq!(queue.pending_count(), 3);
    }
}

//! In-process queue backend.
//!
//! Mirrors the broker semantics the service relies on: messages published
//! before a consumer subscribes are held until one does, deliveries stay
//! unacknowledged until acked, a requeued nack redelivers the message with
//! the redelivered flag set, and a nack without requeue moves the payload
//! to `<queue>_dlq`. When a consumer goes away (its receiver is dropped, it
//! is replaced by a new subscription, or the backend is closed) deliveries
//! it never settled go back to the head of the queue as redelivered.
//! Handles are cheap to clone and share state, so tests can inspect the
//! queues the service writes to.

use crate::{QueueError, QueueInterface, QueueMessage};
use async_trait::async_trait;
use order_types::{ConfigSchema, Schema, ValidationError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Pending {
	payload: Vec<u8>,
	redelivered: bool,
}

#[derive(Default)]
struct QueueState {
	pending: VecDeque<Pending>,
	unacked: HashMap<u64, Vec<u8>>,
	subscriber: Option<mpsc::UnboundedSender<QueueMessage>>,
}

impl QueueState {
	/// Returns unsettled deliveries to the head of the queue, oldest first.
	fn recover_unacked(&mut self) {
		let mut tags: Vec<u64> = self.unacked.keys().copied().collect();
		tags.sort_unstable();
		for tag in tags.into_iter().rev() {
			if let Some(payload) = self.unacked.remove(&tag) {
				self.pending.push_front(Pending {
					payload,
					redelivered: true,
				});
			}
		}
	}
}

#[derive(Default)]
struct Inner {
	queues: HashMap<String, QueueState>,
	next_tag: u64,
	closed: bool,
}

impl Inner {
	/// Hands a message to the queue's subscriber, or parks it if there is none.
	fn deliver(&mut self, queue: &str, message: Pending, front: bool) {
		self.next_tag += 1;
		let tag = self.next_tag;
		let state = self.queues.entry(queue.to_string()).or_default();

		if let Some(sender) = &state.subscriber {
			let delivery = QueueMessage {
				queue: queue.to_string(),
				delivery_tag: tag,
				payload: message.payload.clone(),
				redelivered: message.redelivered,
			};
			if sender.send(delivery).is_ok() {
				state.unacked.insert(tag, message.payload);
				return;
			}
			state.subscriber = None;
			state.recover_unacked();
		}

		if front {
			state.pending.push_front(message);
		} else {
			state.pending.push_back(message);
		}
	}
}

/// In-memory queue implementation.
#[derive(Clone, Default)]
pub struct MemoryQueue {
	inner: Arc<Mutex<Inner>>,
}

impl MemoryQueue {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Payloads waiting in `queue` for a consumer.
	pub fn pending(&self, queue: &str) -> Vec<Vec<u8>> {
		self.lock()
			.queues
			.get(queue)
			.map(|state| state.pending.iter().map(|p| p.payload.clone()).collect())
			.unwrap_or_default()
	}

	/// Number of deliveries from `queue` that were neither acked nor nacked.
	pub fn unacked_count(&self, queue: &str) -> usize {
		self.lock()
			.queues
			.get(queue)
			.map(|state| state.unacked.len())
			.unwrap_or_default()
	}

	/// Payloads dead-lettered from `queue`.
	pub fn dead_letters(&self, queue: &str) -> Vec<Vec<u8>> {
		self.pending(&format!("{}_dlq", queue))
	}

	fn settle(&self, message: &QueueMessage) -> Result<(MutexGuard<'_, Inner>, Vec<u8>), QueueError> {
		let mut inner = self.lock();
		let payload = inner
			.queues
			.get_mut(&message.queue)
			.and_then(|state| state.unacked.remove(&message.delivery_tag))
			.ok_or_else(|| QueueError::Acknowledge {
				queue: message.queue.clone(),
				message: format!("unknown delivery tag {}", message.delivery_tag),
			})?;
		Ok((inner, payload))
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn declare(&self, queue: &str) -> Result<(), QueueError> {
		let mut inner = self.lock();
		if inner.closed {
			return Err(QueueError::Closed);
		}
		inner.queues.entry(queue.to_string()).or_default();
		Ok(())
	}

	async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
		let mut inner = self.lock();
		if inner.closed {
			return Err(QueueError::Closed);
		}
		inner.deliver(
			queue,
			Pending {
				payload,
				redelivered: false,
			},
			false,
		);
		Ok(())
	}

	async fn subscribe(
		&self,
		queue: &str,
	) -> Result<mpsc::UnboundedReceiver<QueueMessage>, QueueError> {
		let mut inner = self.lock();
		if inner.closed {
			return Err(QueueError::Closed);
		}

		let (sender, receiver) = mpsc::unbounded_channel();
		let state = inner.queues.entry(queue.to_string()).or_default();
		state.subscriber = Some(sender);
		state.recover_unacked();
		let backlog: Vec<Pending> = state.pending.drain(..).collect();

		for message in backlog {
			inner.deliver(queue, message, false);
		}
		Ok(receiver)
	}

	async fn ack(&self, message: &QueueMessage) -> Result<(), QueueError> {
		self.settle(message).map(|_| ())
	}

	async fn nack(&self, message: &QueueMessage, requeue: bool) -> Result<(), QueueError> {
		let (mut inner, payload) = self.settle(message)?;
		if requeue {
			inner.deliver(
				&message.queue,
				Pending {
					payload,
					redelivered: true,
				},
				true,
			);
		} else {
			inner
				.queues
				.entry(format!("{}_dlq", message.queue))
				.or_default()
				.pending
				.push_back(Pending {
					payload,
					redelivered: false,
				});
		}
		Ok(())
	}

	async fn close(&self) -> Result<(), QueueError> {
		let mut inner = self.lock();
		inner.closed = true;
		for state in inner.queues.values_mut() {
			state.subscriber = None;
			state.recover_unacked();
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryQueueSchema)
	}
}

/// Configuration schema for MemoryQueue.
pub struct MemoryQueueSchema;

impl ConfigSchema for MemoryQueueSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory queue backend from configuration.
pub fn create_queue(config: &toml::Value) -> Result<Box<dyn QueueInterface>, QueueError> {
	MemoryQueueSchema
		.validate(config)
		.map_err(|e| QueueError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryQueue::new()))
}

/// Registry for the memory queue implementation.
pub struct Registry;

impl order_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::QueueFactory;

	fn factory() -> Self::Factory {
		create_queue
	}
}

impl crate::QueueRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_backlog_delivered_on_subscribe() {
		let queue = MemoryQueue::new();
		queue.publish("q", b"one".to_vec()).await.unwrap();
		queue.publish("q", b"two".to_vec()).await.unwrap();
		assert_eq!(queue.pending("q").len(), 2);

		let mut rx = queue.subscribe("q").await.unwrap();
		assert_eq!(rx.recv().await.unwrap().payload, b"one".to_vec());
		assert_eq!(rx.recv().await.unwrap().payload, b"two".to_vec());
		assert!(queue.pending("q").is_empty());
		assert_eq!(queue.unacked_count("q"), 2);
	}

	#[tokio::test]
	async fn test_ack_settles_delivery_once() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("q").await.unwrap();
		queue.publish("q", b"x".to_vec()).await.unwrap();

		let message = rx.recv().await.unwrap();
		queue.ack(&message).await.unwrap();
		assert_eq!(queue.unacked_count("q"), 0);
		assert!(matches!(
			queue.ack(&message).await,
			Err(QueueError::Acknowledge { .. })
		));
	}

	#[tokio::test]
	async fn test_nack_requeue_redelivers() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("q").await.unwrap();
		queue.publish("q", b"x".to_vec()).await.unwrap();

		let first = rx.recv().await.unwrap();
		assert!(!first.redelivered);
		queue.nack(&first, true).await.unwrap();

		let second = rx.recv().await.unwrap();
		assert!(second.redelivered);
		assert_eq!(second.payload, first.payload);
		assert_ne!(second.delivery_tag, first.delivery_tag);
	}

	#[tokio::test]
	async fn test_nack_without_requeue_dead_letters() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("q").await.unwrap();
		queue.publish("q", b"poison".to_vec()).await.unwrap();

		let message = rx.recv().await.unwrap();
		queue.nack(&message, false).await.unwrap();

		assert_eq!(queue.dead_letters("q"), vec![b"poison".to_vec()]);
		assert_eq!(queue.unacked_count("q"), 0);
	}

	#[tokio::test]
	async fn test_close_ends_subscriptions() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("q").await.unwrap();
		queue.close().await.unwrap();

		assert!(rx.recv().await.is_none());
		assert!(matches!(
			queue.publish("q", b"late".to_vec()).await,
			Err(QueueError::Closed)
		));
	}

	#[tokio::test]
	async fn test_unsettled_deliveries_redelivered_to_next_subscriber() {
		let queue = MemoryQueue::new();
		let mut first = queue.subscribe("q").await.unwrap();
		queue.publish("q", b"one".to_vec()).await.unwrap();
		queue.publish("q", b"two".to_vec()).await.unwrap();
		first.recv().await.unwrap();
		first.recv().await.unwrap();
		drop(first);

		let mut second = queue.subscribe("q").await.unwrap();
		assert_eq!(queue.unacked_count("q"), 2);
		let one = second.recv().await.unwrap();
		let two = second.recv().await.unwrap();
		assert_eq!(one.payload, b"one".to_vec());
		assert!(one.redelivered);
		assert_eq!(two.payload, b"two".to_vec());
		assert!(two.redelivered);
	}

	#[tokio::test]
	async fn test_close_returns_unsettled_deliveries() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("q").await.unwrap();
		queue.publish("q", b"x".to_vec()).await.unwrap();
		let message = rx.recv().await.unwrap();

		queue.close().await.unwrap();

		assert_eq!(queue.unacked_count("q"), 0);
		assert_eq!(queue.pending("q"), vec![b"x".to_vec()]);
		assert!(queue.ack(&message).await.is_err());
	}
}

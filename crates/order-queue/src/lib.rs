//! Message queue module for the order tracking service.
//!
//! This module connects the service to the message broker. Backends expose
//! at-least-once delivery over named durable queues: messages received
//! through a subscription stay unacknowledged until the consumer acks or
//! nacks them. The [`QueueService`] adds JSON encoding and typed queue names.

use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry, QueueName};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Re-export implementations
pub mod implementations {
	pub mod amqp;
	pub mod memory;
}

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// Error that occurs when connecting to the broker fails.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when declaring a queue fails.
	#[error("Declare error on '{queue}': {message}")]
	Declare { queue: String, message: String },
	/// Error that occurs when publishing a message fails.
	#[error("Publish error on '{queue}': {message}")]
	Publish { queue: String, message: String },
	/// Error that occurs when starting a consumer fails.
	#[error("Subscribe error on '{queue}': {message}")]
	Subscribe { queue: String, message: String },
	/// Error that occurs when acknowledging a delivery fails.
	#[error("Acknowledge error on '{queue}': {message}")]
	Acknowledge { queue: String, message: String },
	/// Error that occurs when encoding a message fails.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The backend has been closed.
	#[error("Queue backend is closed")]
	Closed,
}

/// A message delivered from a queue.
///
/// The message must be passed back to [`QueueInterface::ack`] or
/// [`QueueInterface::nack`] once handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
	/// Queue the message was delivered from.
	pub queue: String,
	/// Broker-assigned tag identifying this delivery.
	pub delivery_tag: u64,
	/// Raw message body.
	pub payload: Vec<u8>,
	/// True if the broker delivered this message before.
	pub redelivered: bool,
}

/// Trait defining the interface for message broker backends.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Declares a durable queue. Declaring an existing queue is a no-op.
	async fn declare(&self, queue: &str) -> Result<(), QueueError>;

	/// Publishes a persistent message to a queue.
	async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError>;

	/// Starts consuming a queue. Deliveries arrive on the returned channel,
	/// which closes when the consumer stops.
	async fn subscribe(
		&self,
		queue: &str,
	) -> Result<mpsc::UnboundedReceiver<QueueMessage>, QueueError>;

	/// Acknowledges a delivery, removing it from the queue.
	async fn ack(&self, message: &QueueMessage) -> Result<(), QueueError>;

	/// Rejects a delivery. With `requeue` the broker redelivers it,
	/// otherwise it is dead-lettered or dropped.
	async fn nack(&self, message: &QueueMessage, requeue: bool) -> Result<(), QueueError>;

	/// Stops all consumers and releases the broker connection.
	async fn close(&self) -> Result<(), QueueError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for queue factory functions.
pub type QueueFactory = fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>;

/// Registry trait for queue implementations.
pub trait QueueRegistry: ImplementationRegistry<Factory = QueueFactory> {}

/// Get all registered queue implementations.
pub fn get_all_implementations() -> Vec<(&'static str, QueueFactory)> {
	use implementations::{amqp, memory};

	vec![
		(amqp::Registry::NAME, amqp::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level queue service with typed queue names and JSON payloads.
pub struct QueueService {
	backend: Box<dyn QueueInterface>,
}

impl QueueService {
	pub fn new(backend: Box<dyn QueueInterface>) -> Self {
		Self { backend }
	}

	/// Declares every queue the service uses.
	pub async fn declare_all(&self) -> Result<(), QueueError> {
		for queue in QueueName::all() {
			self.backend.declare(queue.as_str()).await?;
		}
		Ok(())
	}

	/// Encodes `message` as JSON and publishes it to `queue`.
	pub async fn publish<T: Serialize>(
		&self,
		queue: QueueName,
		message: &T,
	) -> Result<(), QueueError> {
		let payload =
			serde_json::to_vec(message).map_err(|e| QueueError::Serialization(e.to_string()))?;
		self.backend.publish(queue.as_str(), payload).await
	}

	pub async fn subscribe(
		&self,
		queue: QueueName,
	) -> Result<mpsc::UnboundedReceiver<QueueMessage>, QueueError> {
		self.backend.subscribe(queue.as_str()).await
	}

	pub async fn ack(&self, message: &QueueMessage) -> Result<(), QueueError> {
		self.backend.ack(message).await
	}

	pub async fn nack(&self, message: &QueueMessage, requeue: bool) -> Result<(), QueueError> {
		self.backend.nack(message, requeue).await
	}

	pub async fn close(&self) -> Result<(), QueueError> {
		self.backend.close().await
	}
}

//! Completion handler for kitchen notifications.
//!
//! Each message from the `order_done` queue is decoded, validated and
//! applied to the referenced order, yielding a [`CompletionOutcome`]. The
//! outcome and the configured [`FailurePolicy`] decide whether the delivery
//! is acknowledged or handed back to the broker. Only persistence failures
//! are ever negatively acknowledged: a malformed message or an unknown
//! order cannot succeed on redelivery.

use crate::logs::LogSink;
use crate::state::{CompletionUpdate, OrderStateError, OrderStateMachine};
use order_config::FailurePolicy;
use order_queue::{QueueMessage, QueueService};
use order_types::{truncate_id, CompletionMessage, OrderId};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while settling a completion message.
#[derive(Debug, Error)]
pub enum CompletionError {
	#[error("Queue error: {0}")]
	Queue(String),
}

/// Result of processing one completion message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
	/// The order is now completed with the message's dish data.
	Applied(OrderId),
	/// The payload was not a completion message.
	Malformed(String),
	/// The message referenced a string that is not an order id.
	InvalidId(String),
	/// No order exists with the referenced id.
	NotFound(OrderId),
	/// Reading or writing the order failed.
	Failed { order_id: OrderId, reason: String },
}

/// How a processed delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
	Ack,
	Nack { requeue: bool },
}

impl CompletionOutcome {
	/// Chooses how to settle the delivery that produced this outcome.
	pub fn acknowledgement(&self, policy: FailurePolicy) -> Acknowledgement {
		match (self, policy) {
			(CompletionOutcome::Failed { .. }, FailurePolicy::Requeue) => {
				Acknowledgement::Nack { requeue: true }
			},
			(CompletionOutcome::Failed { .. }, FailurePolicy::DeadLetter) => {
				Acknowledgement::Nack { requeue: false }
			},
			_ => Acknowledgement::Ack,
		}
	}
}

/// Applies completion messages to orders.
pub struct CompletionHandler {
	state_machine: Arc<OrderStateMachine>,
	queue: Arc<QueueService>,
	logs: Arc<LogSink>,
	policy: FailurePolicy,
}

impl CompletionHandler {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		queue: Arc<QueueService>,
		logs: Arc<LogSink>,
		policy: FailurePolicy,
	) -> Self {
		Self {
			state_machine,
			queue,
			logs,
			policy,
		}
	}

	/// Processes a delivery and settles it with the broker.
	///
	/// The delivery is settled only after the update attempt has finished.
	#[instrument(skip_all, fields(delivery_tag = message.delivery_tag, redelivered = message.redelivered))]
	pub async fn handle(&self, message: &QueueMessage) -> Result<CompletionOutcome, CompletionError> {
		let outcome = self.process(&message.payload).await;

		let settled = match outcome.acknowledgement(self.policy) {
			Acknowledgement::Ack => self.queue.ack(message).await,
			Acknowledgement::Nack { requeue } => self.queue.nack(message, requeue).await,
		};
		settled.map_err(|e| CompletionError::Queue(e.to_string()))?;

		Ok(outcome)
	}

	/// Decodes and applies one completion payload.
	pub async fn process(&self, payload: &[u8]) -> CompletionOutcome {
		let message: CompletionMessage = match serde_json::from_slice(payload) {
			Ok(message) => message,
			Err(e) => {
				self.logs
					.warning(
						"Discarding malformed completion message",
						Some(json!({ "error": e.to_string() })),
					)
					.await;
				return CompletionOutcome::Malformed(e.to_string());
			},
		};

		let order_id: OrderId = match message.order_id.parse() {
			Ok(id) => id,
			Err(_) => {
				self.logs
					.warning(
						"Invalid order id in completion message",
						Some(json!({ "orderId": message.order_id })),
					)
					.await;
				return CompletionOutcome::InvalidId(message.order_id);
			},
		};

		self.apply(order_id, message).await
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(order_id.as_str())))]
	async fn apply(&self, order_id: OrderId, message: CompletionMessage) -> CompletionOutcome {
		let update = CompletionUpdate {
			dish: message.dish,
			image: message.image,
			description: message.description,
		};

		match self.state_machine.complete_order(&order_id, update).await {
			Ok(order) => {
				let dish = order.completion().map(|c| c.dish.clone());
				self.logs
					.info(
						"Order completed",
						Some(json!({ "orderId": order_id, "dish": dish })),
					)
					.await;
				CompletionOutcome::Applied(order_id)
			},
			Err(OrderStateError::OrderNotFound(_)) => {
				self.logs
					.warning(
						"Completion for unknown order",
						Some(json!({ "orderId": order_id })),
					)
					.await;
				CompletionOutcome::NotFound(order_id)
			},
			Err(e) => {
				self.logs
					.error(
						"Failed to apply completion",
						Some(json!({
							"orderId": order_id,
							"error": e.to_string(),
							"policy": self.policy,
						})),
					)
					.await;
				CompletionOutcome::Failed {
					order_id,
					reason: e.to_string(),
				}
			},
		}
	}
}

//! Order handler for creation and read projections.
//!
//! Creation persists the order before publishing the work message for the
//! kitchen. Reads validate the identifier before touching storage, so a
//! malformed reference never reaches the persistence layer.

use crate::logs::LogSink;
use crate::state::{OrderStateError, OrderStateMachine};
use order_queue::QueueService;
use order_types::{
	truncate_id, Order, OrderDetails, OrderId, OrderSummary, QueueName, WorkMessage,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while serving order requests.
#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Invalid order id: {0}")]
	InvalidId(String),
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Queue error: {0}")]
	Queue(String),
}

impl From<OrderStateError> for OrderError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::OrderNotFound(id) => OrderError::NotFound(id),
			other => OrderError::Storage(other.to_string()),
		}
	}
}

/// Handler for order creation and queries.
pub struct OrderHandler {
	state_machine: Arc<OrderStateMachine>,
	queue: Arc<QueueService>,
	logs: Arc<LogSink>,
}

impl OrderHandler {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		queue: Arc<QueueService>,
		logs: Arc<LogSink>,
	) -> Self {
		Self {
			state_machine,
			queue,
			logs,
		}
	}

	/// Creates an order and hands it to the kitchen.
	///
	/// If publishing fails the order stays persisted in progress and the
	/// failure is returned to the caller.
	pub async fn create(&self) -> Result<Order, OrderError> {
		let order = self.state_machine.create_order().await?;
		let message = WorkMessage {
			order_id: order.id.to_string(),
		};

		if let Err(e) = self.queue.publish(QueueName::Orders, &message).await {
			self.logs
				.error(
					"Failed to publish work message",
					Some(json!({ "orderId": order.id, "error": e.to_string() })),
				)
				.await;
			return Err(OrderError::Queue(e.to_string()));
		}

		self.logs
			.info("Order created", Some(json!({ "orderId": order.id })))
			.await;
		Ok(order)
	}

	/// Returns the summary projection of one order.
	#[instrument(skip_all, fields(order_id = %truncate_id(raw_id)))]
	pub async fn summary(&self, raw_id: &str) -> Result<OrderSummary, OrderError> {
		let order = self.load(raw_id).await?;
		Ok(OrderSummary::from(&order))
	}

	/// Returns the detail projection of one order.
	#[instrument(skip_all, fields(order_id = %truncate_id(raw_id)))]
	pub async fn details(&self, raw_id: &str) -> Result<OrderDetails, OrderError> {
		let order = self.load(raw_id).await?;
		Ok(OrderDetails::from(&order))
	}

	/// Returns the summaries of all orders, oldest first.
	pub async fn list(&self) -> Result<Vec<OrderSummary>, OrderError> {
		let orders = self.state_machine.list_orders().await?;
		Ok(orders.iter().map(OrderSummary::from).collect())
	}

	async fn load(&self, raw_id: &str) -> Result<Order, OrderError> {
		let order_id: OrderId = raw_id
			.parse()
			.map_err(|_| OrderError::InvalidId(raw_id.to_string()))?;
		Ok(self.state_machine.get_order(&order_id).await?)
	}
}

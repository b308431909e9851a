//! Order state machine implementation.
//!
//! Orders move through `in-progress -> completed`. A completed order may be
//! completed again, which overwrites its dish data and finish time; this
//! keeps redelivered completion messages harmless. No transition leads back
//! to `in-progress`.

use chrono::Utc;
use once_cell::sync::Lazy;
use order_storage::{StorageError, StorageService};
use order_types::{Completion, Order, OrderId, OrderState, OrderStatus, StorageKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
}

impl OrderStateError {
	fn from_storage(order_id: &OrderId, err: StorageError) -> Self {
		match err {
			StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
			other => OrderStateError::Storage(other.to_string()),
		}
	}
}

/// Completion data reported by the kitchen for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionUpdate {
	pub dish: String,
	pub image: Option<String>,
	pub description: Option<String>,
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Persists a new in-progress order under a freshly assigned id.
	pub async fn create_order(&self) -> Result<Order, OrderStateError> {
		let created_at = Utc::now();
		self.storage
			.insert(StorageKey::Orders.as_str(), |id| Order::new(id, created_at))
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id.as_str())
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))
	}

	/// Returns all orders, oldest first.
	pub async fn list_orders(&self) -> Result<Vec<Order>, OrderStateError> {
		let mut orders: Vec<Order> = self
			.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;

		orders.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.id.cmp(&b.id))
		});
		Ok(orders)
	}

	/// Moves an order to `completed`, stamping `finished_at` with the
	/// current time.
	///
	/// The order is replaced in a single write keyed by its id; if it was
	/// removed since it was read, `OrderNotFound` is returned.
	pub async fn complete_order(
		&self,
		order_id: &OrderId,
		update: CompletionUpdate,
	) -> Result<Order, OrderStateError> {
		let mut order = self.get_order(order_id).await?;

		if !Self::is_valid_transition(order.status(), OrderStatus::Completed) {
			return Err(OrderStateError::InvalidTransition {
				from: order.status(),
				to: OrderStatus::Completed,
			});
		}

		order.state = OrderState::Completed(Completion {
			dish: update.dish,
			image: update.image,
			description: update.description,
			finished_at: Utc::now(),
		});

		self.storage
			.update(StorageKey::Orders.as_str(), order_id.as_str(), &order)
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))?;

		Ok(order)
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
			HashMap::from([
				(OrderStatus::InProgress, HashSet::from([OrderStatus::Completed])),
				(OrderStatus::Completed, HashSet::from([OrderStatus::Completed])),
			])
		});

		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}
}

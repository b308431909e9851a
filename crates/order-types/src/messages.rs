//! Queue names and message payloads.
//!
//! The service publishes work messages for the kitchen service, consumes the
//! kitchen's completion messages and mirrors log entries published by other
//! services.

use serde::{Deserialize, Serialize};

/// Queues used by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
	/// Outbound work items for the kitchen service.
	Orders,
	/// Inbound completion notifications.
	OrderDone,
	/// Inbound log entries from other services.
	SystemLogs,
}

impl QueueName {
	pub fn as_str(&self) -> &'static str {
		match self {
			QueueName::Orders => "orders",
			QueueName::OrderDone => "order_done",
			QueueName::SystemLogs => "system_logs",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::OrderDone, Self::SystemLogs].into_iter()
	}
}

/// Work item published when an order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
	pub order_id: String,
}

/// Completion notification published by the kitchen service.
///
/// `order_id` is kept as a raw string so that malformed references can be
/// reported by the consumer instead of failing payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
	pub order_id: String,
	pub dish: String,
	#[serde(default)]
	pub image: Option<String>,
	#[serde(default)]
	pub description: Option<String>,
}

//! Order types for the order tracking service.
//!
//! An order starts in preparation and is completed exactly once by a
//! completion message from the kitchen service. The completion data only
//! exists inside the `Completed` state, so an in-progress order can never
//! carry a dish or a finish time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use uuid::Uuid;

/// Number of hex characters in a document identifier.
pub const ORDER_ID_LEN: usize = 24;

/// Error returned when a string is not a valid order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid order id '{0}': expected {ORDER_ID_LEN} hexadecimal characters")]
pub struct InvalidOrderId(pub String);

/// Document identifier assigned by the storage layer.
///
/// Identifiers are 12 bytes rendered as 24 lowercase hex characters:
/// a 4-byte creation timestamp, 5 random bytes and a 3-byte counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

/// Identifier of an order.
pub type OrderId = ObjectId;

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

impl ObjectId {
	/// Generates a fresh identifier.
	pub fn generate() -> Self {
		let seconds = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
		let random = Uuid::new_v4();
		let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

		let mut bytes = [0u8; ORDER_ID_LEN / 2];
		bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
		bytes[4..9].copy_from_slice(&random.as_bytes()[..5]);
		bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..]);

		Self(hex::encode(bytes))
	}

	/// Returns true if `value` has the shape of an order identifier.
	pub fn is_valid(value: &str) -> bool {
		value.len() == ORDER_ID_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl FromStr for ObjectId {
	type Err = InvalidOrderId;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if Self::is_valid(s) {
			Ok(Self(s.to_ascii_lowercase()))
		} else {
			Err(InvalidOrderId(s.to_string()))
		}
	}
}

impl TryFrom<String> for ObjectId {
	type Error = InvalidOrderId;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<ObjectId> for String {
	fn from(id: ObjectId) -> Self {
		id.0
	}
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Status of an order as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
	/// The order has been accepted and is being prepared.
	InProgress,
	/// The kitchen reported the order as finished.
	Completed,
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::InProgress => write!(f, "in-progress"),
			OrderStatus::Completed => write!(f, "completed"),
		}
	}
}

/// Data attached to an order when it is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
	/// Name of the prepared dish.
	pub dish: String,
	/// Image of the dish, if the kitchen provided one.
	pub image: Option<String>,
	/// Description of the dish, if the kitchen provided one.
	pub description: Option<String>,
	/// When the order reached the completed state.
	pub finished_at: DateTime<Utc>,
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum OrderState {
	InProgress,
	Completed(Completion),
}

impl OrderState {
	pub fn status(&self) -> OrderStatus {
		match self {
			OrderState::InProgress => OrderStatus::InProgress,
			OrderState::Completed(_) => OrderStatus::Completed,
		}
	}
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Identifier assigned by storage at creation.
	pub id: ObjectId,
	/// When the order was created.
	pub created_at: DateTime<Utc>,
	/// Current lifecycle state.
	#[serde(flatten)]
	pub state: OrderState,
}

impl Order {
	/// Creates a new order in preparation.
	pub fn new(id: ObjectId, created_at: DateTime<Utc>) -> Self {
		Self {
			id,
			created_at,
			state: OrderState::InProgress,
		}
	}

	pub fn status(&self) -> OrderStatus {
		self.state.status()
	}

	/// Returns the completion data if the order is completed.
	pub fn completion(&self) -> Option<&Completion> {
		match &self.state {
			OrderState::Completed(completion) => Some(completion),
			OrderState::InProgress => None,
		}
	}

	pub fn finished_at(&self) -> Option<DateTime<Utc>> {
		self.completion().map(|c| c.finished_at)
	}
}

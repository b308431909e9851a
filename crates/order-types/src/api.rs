//! API types for the order tracking HTTP API.
//!
//! This module defines the response shapes returned by the order and log
//! endpoints, and the structured error type that maps domain failures to
//! HTTP status codes.

use crate::{Order, OrderState, OrderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message returned by the detail projection while an order is being prepared.
pub const IN_PREPARATION_MESSAGE: &str = "still in preparation";

/// Response to a successful order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
	pub order_id: String,
	pub status: OrderStatus,
}

/// Flat view of an order used by the get and list endpoints.
///
/// Optional fields are always serialized, as `null` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
	pub order_id: String,
	pub status: OrderStatus,
	pub dish: Option<String>,
	pub image: Option<String>,
	pub description: Option<String>,
	pub created_at: DateTime<Utc>,
	pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderSummary {
	fn from(order: &Order) -> Self {
		let completion = order.completion();
		Self {
			order_id: order.id.to_string(),
			status: order.status(),
			dish: completion.map(|c| c.dish.clone()),
			image: completion.and_then(|c| c.image.clone()),
			description: completion.and_then(|c| c.description.clone()),
			created_at: order.created_at,
			finished_at: completion.map(|c| c.finished_at),
		}
	}
}

/// Dish information nested in the detail view of a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishDetails {
	pub name: String,
	pub image: Option<String>,
	pub description: Option<String>,
}

/// Detail view of a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedOrderDetails {
	pub order_id: String,
	pub status: OrderStatus,
	pub created_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	pub dish: DishDetails,
	/// Seconds between creation and completion, rounded.
	pub processing_time: i64,
}

/// Detail view of an order still in preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrderDetails {
	pub order_id: String,
	pub status: OrderStatus,
	pub created_at: DateTime<Utc>,
	pub message: String,
}

/// Detail view of an order; the shape depends on its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderDetails {
	Completed(CompletedOrderDetails),
	InProgress(PendingOrderDetails),
}

/// Rounds the elapsed time between two instants to whole seconds.
pub fn processing_seconds(created_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> i64 {
	let millis = (finished_at - created_at).num_milliseconds();
	(millis as f64 / 1000.0).round() as i64
}

impl From<&Order> for OrderDetails {
	fn from(order: &Order) -> Self {
		match &order.state {
			OrderState::Completed(completion) => OrderDetails::Completed(CompletedOrderDetails {
				order_id: order.id.to_string(),
				status: OrderStatus::Completed,
				created_at: order.created_at,
				finished_at: completion.finished_at,
				dish: DishDetails {
					name: completion.dish.clone(),
					image: completion.image.clone(),
					description: completion.description.clone(),
				},
				processing_time: processing_seconds(order.created_at, completion.finished_at),
			}),
			OrderState::InProgress => OrderDetails::InProgress(PendingOrderDetails {
				order_id: order.id.to_string(),
				status: OrderStatus::InProgress,
				created_at: order.created_at,
				message: IN_PREPARATION_MESSAGE.to_string(),
			}),
		}
	}
}

/// API error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Machine-readable error code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request data (400)
	BadRequest { error_type: String, message: String },
	/// Referenced resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Infrastructure failure (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			APIError::BadRequest { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::InternalServerError { error_type, message } => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = match self.status_code() {
			400 => StatusCode::BAD_REQUEST,
			404 => StatusCode::NOT_FOUND,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};

		(status, Json(self.to_error_response())).into_response()
	}
}

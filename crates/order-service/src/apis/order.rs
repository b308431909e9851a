//! Order endpoints.
//!
//! Thin adapters over the engine's order handler that translate handler
//! errors into API errors. Infrastructure failures are logged in full and
//! reported to the client with a generic message.

use order_core::{OrderEngine, OrderError};
use order_types::{APIError, CreateOrderResponse, OrderDetails, OrderSummary};

/// Maps an order handler error to its HTTP representation.
pub fn api_error(err: OrderError) -> APIError {
	match err {
		OrderError::InvalidId(message) => APIError::BadRequest {
			error_type: "INVALID_ORDER_ID".to_string(),
			message: format!("Invalid order id: {}", message),
		},
		OrderError::NotFound(id) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message: format!("Order {} not found", id),
		},
		other => {
			tracing::error!(error = %other, "Order request failed");
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: "An internal error occurred".to_string(),
			}
		},
	}
}

pub async fn create_order(engine: &OrderEngine) -> Result<CreateOrderResponse, APIError> {
	let order = engine.order_handler().create().await.map_err(api_error)?;
	tracing::info!(order_id = %order.id, "Order accepted");
	Ok(CreateOrderResponse {
		order_id: order.id.to_string(),
		status: order.status(),
	})
}

pub async fn list_orders(engine: &OrderEngine) -> Result<Vec<OrderSummary>, APIError> {
	engine.order_handler().list().await.map_err(api_error)
}

pub async fn get_order(id: &str, engine: &OrderEngine) -> Result<OrderSummary, APIError> {
	engine.order_handler().summary(id).await.map_err(api_error)
}

pub async fn get_order_details(id: &str, engine: &OrderEngine) -> Result<OrderDetails, APIError> {
	engine.order_handler().details(id).await.map_err(api_error)
}

//! HTTP server for the order tracking API.

use axum::{
	extract::{rejection::QueryRejection, Path, Query, State},
	http::{HeaderValue, StatusCode},
	response::Json,
	routing::{get, post},
	Router,
};
use order_config::{ApiConfig, CorsConfig};
use order_core::OrderEngine;
use order_types::{
	APIError, CreateOrderResponse, LogEntry, LogQuery, OrderDetails, OrderSummary,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Engine serving order and log requests.
	pub engine: Arc<OrderEngine>,
}

/// Starts the HTTP server and serves until the engine signals shutdown.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<OrderEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState {
		engine: Arc::clone(&engine),
	})
	.layer(cors_layer(api_config.cors.as_ref()));

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async move { engine.stopped().await })
		.await?;

	tracing::info!("Order API server stopped");
	Ok(())
}

/// Builds the application routes.
pub(crate) fn router(state: AppState) -> Router {
	Router::new()
		.route("/orders", post(handle_create_order).get(handle_list_orders))
		.route("/orders/logs", get(handle_query_logs))
		.route("/orders/{id}", get(handle_get_order))
		.route("/orders/{id}/details", get(handle_get_order_details))
		.route("/logs", get(handle_query_logs))
		.route("/health", get(handle_health))
		.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
		.with_state(state)
}

/// Restricts origins when configured, permissive otherwise.
fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods(tower_http::cors::Any)
		.allow_headers(tower_http::cors::Any)
}

/// Handles POST /orders requests.
async fn handle_create_order(
	State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), APIError> {
	let response = crate::apis::order::create_order(&state.engine).await?;
	Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Handles GET /orders requests.
async fn handle_list_orders(
	State(state): State<AppState>,
) -> Result<Json<Vec<OrderSummary>>, APIError> {
	crate::apis::order::list_orders(&state.engine).await.map(Json)
}

/// Handles GET /orders/{id} requests.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderSummary>, APIError> {
	crate::apis::order::get_order(&id, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /orders/{id}/details requests.
async fn handle_get_order_details(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderDetails>, APIError> {
	crate::apis::order::get_order_details(&id, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /logs and GET /orders/logs requests.
async fn handle_query_logs(
	State(state): State<AppState>,
	query: Result<Query<LogQuery>, QueryRejection>,
) -> Result<Json<Vec<LogEntry>>, APIError> {
	let Query(query) = query.map_err(|e| APIError::BadRequest {
		error_type: "INVALID_QUERY".to_string(),
		message: e.body_text(),
	})?;
	crate::apis::logs::query_logs(&query, &state.engine)
		.await
		.map(Json)
}

async fn handle_health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::{Method, Request};
	use axum::response::Response;
	use order_config::ConfigBuilder;
	use order_core::state::CompletionUpdate;
	use order_core::{OrderEngineBuilder, OrderFactories};
	use order_queue::QueueFactory;
	use order_storage::StorageFactory;
	use tower::ServiceExt;

	fn engine() -> Arc<OrderEngine> {
		let factories: OrderFactories<StorageFactory, QueueFactory> = OrderFactories {
			storage_factories: order_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			queue_factories: order_queue::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		Arc::new(
			OrderEngineBuilder::new(ConfigBuilder::new().service_name("orders-test").build())
				.build(factories)
				.unwrap(),
		)
	}

	async fn send(engine: &Arc<OrderEngine>, method: Method, uri: &str) -> Response {
		router(AppState {
			engine: Arc::clone(engine),
		})
		.oneshot(
			Request::builder()
				.method(method)
				.uri(uri)
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap()
	}

	async fn body_json(response: Response) -> Value {
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn test_health() {
		let engine = engine();
		let response = send(&engine, Method::GET, "/health").await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(body_json(response).await, json!({ "status": "ok" }));
	}

	#[tokio::test]
	async fn test_create_then_complete_order() {
		let engine = engine();

		let response = send(&engine, Method::POST, "/orders").await;
		assert_eq!(response.status(), StatusCode::ACCEPTED);
		let created = body_json(response).await;
		assert_eq!(created["status"], "in-progress");
		let id = created["orderId"].as_str().unwrap().to_string();

		let response = send(&engine, Method::GET, &format!("/orders/{}/details", id)).await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(body_json(response).await["message"], "still in preparation");

		engine
			.state_machine()
			.complete_order(
				&id.parse().unwrap(),
				CompletionUpdate {
					dish: "Tortilla".to_string(),
					image: None,
					description: None,
				},
			)
			.await
			.unwrap();

		let response = send(&engine, Method::GET, &format!("/orders/{}", id)).await;
		assert_eq!(response.status(), StatusCode::OK);
		let summary = body_json(response).await;
		assert_eq!(summary["status"], "completed");
		assert_eq!(summary["dish"], "Tortilla");
		assert!(summary["image"].is_null());
		assert!(summary["description"].is_null());
		assert!(summary["finishedAt"].is_string());
	}

	#[tokio::test]
	async fn test_list_orders() {
		let engine = engine();
		for _ in 0..2 {
			send(&engine, Method::POST, "/orders").await;
		}

		let response = send(&engine, Method::GET, "/orders").await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
	}

	#[tokio::test]
	async fn test_invalid_id_is_bad_request() {
		let engine = engine();
		for uri in ["/orders/not-an-id", "/orders/not-an-id/details"] {
			let response = send(&engine, Method::GET, uri).await;
			assert_eq!(response.status(), StatusCode::BAD_REQUEST);
			assert_eq!(body_json(response).await["error"], "INVALID_ORDER_ID");
		}
	}

	#[tokio::test]
	async fn test_absent_id_is_not_found() {
		let engine = engine();
		let response = send(&engine, Method::GET, "/orders/507f1f77bcf86cd799439011").await;
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		assert_eq!(body_json(response).await["error"], "ORDER_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_query_logs() {
		let engine = engine();
		send(&engine, Method::POST, "/orders").await;

		for uri in ["/logs?service=orders-test&level=info", "/orders/logs?limit=1&sort=asc"] {
			let response = send(&engine, Method::GET, uri).await;
			assert_eq!(response.status(), StatusCode::OK);
			let entries = body_json(response).await;
			assert_eq!(entries.as_array().unwrap().len(), 1);
			assert_eq!(entries[0]["message"], "Order created");
		}
	}

	#[tokio::test]
	async fn test_bad_log_query() {
		let engine = engine();
		let response = send(&engine, Method::GET, "/logs?limit=many").await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(body_json(response).await["error"], "INVALID_QUERY");
	}
}

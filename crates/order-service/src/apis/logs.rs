//! Log query endpoint.

use order_core::{LogError, OrderEngine};
use order_types::{APIError, LogEntry, LogQuery};

pub async fn query_logs(query: &LogQuery, engine: &OrderEngine) -> Result<Vec<LogEntry>, APIError> {
	engine.logs().query(query).await.map_err(|e: LogError| {
		tracing::error!(error = %e, "Log query failed");
		APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: "An internal error occurred".to_string(),
		}
	})
}

//! Structured log sink.
//!
//! Domain diagnostics are written to the `system_logs` collection as
//! [`LogEntry`] documents so they can be queried over HTTP, and mirrored to
//! `tracing` at the matching level. Entries published by other services on
//! the `system_logs` queue are ingested into the same collection.

use order_storage::StorageService;
use order_types::{LogEntry, LogLevel, LogQuery, ObjectId, StorageKey};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while ingesting or querying log entries.
#[derive(Debug, Error)]
pub enum LogError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid log entry: {0}")]
	Decode(String),
}

/// Persists and queries structured log entries.
pub struct LogSink {
	storage: Arc<StorageService>,
	service: String,
}

impl LogSink {
	/// Creates a sink that stamps its own entries with `service`.
	pub fn new(storage: Arc<StorageService>, service: impl Into<String>) -> Self {
		Self {
			storage,
			service: service.into(),
		}
	}

	/// Records an entry for this service.
	///
	/// Never fails: a storage error is reported through `tracing` only.
	pub async fn record(&self, level: LogLevel, message: &str, data: Option<Value>) {
		let entry = LogEntry::new(&self.service, level, message, data);
		mirror(&entry);
		if let Err(e) = self.persist(&entry).await {
			tracing::warn!(error = %e, "Failed to persist log entry");
		}
	}

	pub async fn info(&self, message: &str, data: Option<Value>) {
		self.record(LogLevel::Info, message, data).await
	}

	pub async fn warning(&self, message: &str, data: Option<Value>) {
		self.record(LogLevel::Warning, message, data).await
	}

	pub async fn error(&self, message: &str, data: Option<Value>) {
		self.record(LogLevel::Error, message, data).await
	}

	/// Decodes an entry published by another service and stores it.
	pub async fn ingest(&self, payload: &[u8]) -> Result<LogEntry, LogError> {
		let entry: LogEntry =
			serde_json::from_slice(payload).map_err(|e| LogError::Decode(e.to_string()))?;
		self.persist(&entry).await?;
		tracing::debug!(service = %entry.service, level = %entry.level, "Ingested log entry");
		Ok(entry)
	}

	/// Returns the entries matching `query`, sorted and paginated.
	pub async fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>, LogError> {
		let entries: Vec<LogEntry> = self
			.storage
			.retrieve_all(StorageKey::SystemLogs.as_str())
			.await
			.map_err(|e| LogError::Storage(e.to_string()))?;
		Ok(query.apply(entries))
	}

	async fn persist(&self, entry: &LogEntry) -> Result<(), LogError> {
		let id = ObjectId::generate();
		self.storage
			.store(StorageKey::SystemLogs.as_str(), id.as_str(), entry)
			.await
			.map_err(|e| LogError::Storage(e.to_string()))
	}
}

fn mirror(entry: &LogEntry) {
	match entry.level {
		LogLevel::Info => {
			tracing::info!(service = %entry.service, data = %entry.data, "{}", entry.message)
		},
		LogLevel::Warning => {
			tracing::warn!(service = %entry.service, data = %entry.data, "{}", entry.message)
		},
		LogLevel::Error => {
			tracing::error!(service = %entry.service, data = %entry.data, "{}", entry.message)
		},
		LogLevel::Debug => {
			tracing::debug!(service = %entry.service, data = %entry.data, "{}", entry.message)
		},
	}
}

//! Structured log entries and log queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of log entries returned by a query.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Info,
	Warning,
	Error,
	Debug,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Info => "info",
			LogLevel::Warning => "warning",
			LogLevel::Error => "error",
			LogLevel::Debug => "debug",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

fn empty_data() -> serde_json::Value {
	serde_json::Value::Object(serde_json::Map::new())
}

/// A structured log entry.
///
/// Entries arriving on the log queue may omit `timestamp` and `data`; the
/// time of receipt and an empty object are used instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	#[serde(default = "Utc::now")]
	pub timestamp: DateTime<Utc>,
	pub service: String,
	pub level: LogLevel,
	pub message: String,
	#[serde(default = "empty_data")]
	pub data: serde_json::Value,
}

impl LogEntry {
	/// Creates an entry stamped with the current time.
	pub fn new(
		service: impl Into<String>,
		level: LogLevel,
		message: impl Into<String>,
		data: Option<serde_json::Value>,
	) -> Self {
		Self {
			timestamp: Utc::now(),
			service: service.into(),
			level,
			message: message.into(),
			data: data.unwrap_or_else(empty_data),
		}
	}
}

/// Sort direction for log queries, by timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
	Asc,
	#[default]
	Desc,
}

fn default_limit() -> usize {
	DEFAULT_LOG_LIMIT
}

/// Filter and pagination for log queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
	pub service: Option<String>,
	pub level: Option<LogLevel>,
	/// Inclusive lower bound on `timestamp`.
	pub start_date: Option<DateTime<Utc>>,
	/// Inclusive upper bound on `timestamp`.
	pub end_date: Option<DateTime<Utc>>,
	#[serde(default = "default_limit")]
	pub limit: usize,
	#[serde(default)]
	pub skip: usize,
	#[serde(default)]
	pub sort: SortOrder,
}

impl Default for LogQuery {
	fn default() -> Self {
		Self {
			service: None,
			level: None,
			start_date: None,
			end_date: None,
			limit: DEFAULT_LOG_LIMIT,
			skip: 0,
			sort: SortOrder::Desc,
		}
	}
}

impl LogQuery {
	/// Returns true if `entry` passes every filter of this query.
	pub fn matches(&self, entry: &LogEntry) -> bool {
		if let Some(service) = &self.service {
			if &entry.service != service {
				return false;
			}
		}
		if let Some(level) = self.level {
			if entry.level != level {
				return false;
			}
		}
		if let Some(start) = self.start_date {
			if entry.timestamp < start {
				return false;
			}
		}
		if let Some(end) = self.end_date {
			if entry.timestamp > end {
				return false;
			}
		}
		true
	}

	/// Filters, sorts and paginates `entries`.
	pub fn apply(&self, entries: Vec<LogEntry>) -> Vec<LogEntry> {
		let mut selected: Vec<LogEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
		match self.sort {
			SortOrder::Asc => selected.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
			SortOrder::Desc => selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
		}
		selected.into_iter().skip(self.skip).take(self.limit).collect()
	}
}

//! Configuration module for the order tracking service.
//!
//! Configuration is loaded from a TOML file. String values may reference
//! environment variables as `${VAR}` or `${VAR:-default}`, which lets the
//! broker and storage locations be injected at deploy time. The parsed
//! configuration is validated before it is returned.

pub mod builders {
	pub mod config;
}

pub use builders::config::ConfigBuilder;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the order service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	#[serde(default)]
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the message queue backend.
	pub queue: QueueConfig,
	/// Behavior of the queue consumers.
	#[serde(default)]
	pub consumer: ConsumerConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Service name recorded in log entries.
	#[serde(default = "default_service_name")]
	pub name: String,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			name: default_service_name(),
		}
	}
}

fn default_service_name() -> String {
	"orders".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the message queue backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of queue implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// What the completion consumer does with a message whose persistence
/// write failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
	/// Log the failure and acknowledge. The completion is lost.
	#[default]
	Acknowledge,
	/// Negatively acknowledge and ask the broker to redeliver.
	Requeue,
	/// Negatively acknowledge without requeue, routing to the dead-letter queue.
	DeadLetter,
}

/// Behavior of the queue consumers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
	#[serde(default)]
	pub failure_policy: FailurePolicy,
	/// Whether to mirror the `system_logs` queue into the log collection.
	#[serde(default = "default_consume_logs")]
	pub consume_logs: bool,
}

impl Default for ConsumerConfig {
	fn default() -> Self {
		Self {
			failure_policy: FailurePolicy::default(),
			consume_logs: default_consume_logs(),
		}
	}
}

fn default_consume_logs() -> bool {
	true
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// CORS configuration. Permissive when absent.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
	3001
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |cap: &regex::Captures| {
		let var_name = &cap[1];
		match (std::env::var(var_name), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.name.trim().is_empty() {
			return Err(ConfigError::Validation("Service name cannot be empty".into()));
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if self.queue.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Queue primary implementation cannot be empty".into(),
			));
		}
		if !self.queue.implementations.contains_key(&self.queue.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary queue '{}' not found in implementations",
				self.queue.primary
			)));
		}

		if let Some(ref api) = self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("API port must be greater than 0".into()));
			}
		}

		Ok(())
	}
}

/// Parses a configuration from a TOML string. Environment variables are
/// resolved and the configuration is validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

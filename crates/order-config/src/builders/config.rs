//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! in-memory backends, particularly useful for testing scenarios.

use crate::{Config, ConsumerConfig, FailurePolicy, QueueConfig, ServiceConfig, StorageConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_name: String,
	queue_primary: String,
	failure_policy: FailurePolicy,
	consume_logs: bool,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a builder using the memory storage and memory queue backends.
	pub fn new() -> Self {
		Self {
			service_name: "orders".to_string(),
			queue_primary: "memory".to_string(),
			failure_policy: FailurePolicy::Acknowledge,
			consume_logs: true,
		}
	}

	pub fn service_name(mut self, name: impl Into<String>) -> Self {
		self.service_name = name.into();
		self
	}

	pub fn queue_primary(mut self, primary: impl Into<String>) -> Self {
		self.queue_primary = primary.into();
		self
	}

	pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
		self.failure_policy = policy;
		self
	}

	pub fn consume_logs(mut self, enabled: bool) -> Self {
		self.consume_logs = enabled;
		self
	}

	/// Builds the `Config` with memory storage and no API section. The
	/// primary queue gets an empty implementation table.
	pub fn build(self) -> Config {
		let empty = || toml::Value::Table(toml::map::Map::new());
		Config {
			service: ServiceConfig {
				name: self.service_name,
			},
			storage: StorageConfig {
				implementations: HashMap::from([("memory".to_string(), empty())]),
				primary: "memory".to_string(),
			},
			queue: QueueConfig {
				implementations: HashMap::from([(self.queue_primary.clone(), empty())]),
				primary: self.queue_primary,
			},
			consumer: ConsumerConfig {
				failure_policy: self.failure_policy,
				consume_logs: self.consume_logs,
			},
			api: None,
		}
	}
}

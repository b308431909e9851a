//! Builder for constructing order engines.
//!
//! Composes an [`OrderEngine`] from the storage and queue implementations
//! named in the configuration, using factory functions keyed by
//! implementation name.

use crate::engine::OrderEngine;
use order_config::Config;
use order_queue::{QueueError, QueueInterface, QueueService};
use order_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component of the engine.
pub struct OrderFactories<SF, QF> {
	pub storage_factories: HashMap<String, SF>,
	pub queue_factories: HashMap<String, QF>,
}

/// Builder for constructing an OrderEngine with pluggable implementations.
pub struct OrderEngineBuilder {
	config: Config,
}

impl OrderEngineBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine from the configured primary storage and queue.
	///
	/// Every configured implementation with a known factory is created so
	/// that configuration errors surface at startup, even for backends that
	/// are not primary.
	pub fn build<SF, QF>(self, factories: OrderFactories<SF, QF>) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		QF: Fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;

		let queue_backend = load_primary(
			"queue",
			&self.config.queue.primary,
			&self.config.queue.implementations,
			&factories.queue_factories,
		)?;

		Ok(OrderEngine::new(
			self.config,
			Arc::new(StorageService::new(storage_backend)),
			Arc::new(QueueService::new(queue_backend)),
		))
	}
}

fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	configured: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in configured {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "Unknown implementation, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' is not among the loaded implementations",
			component, primary
		))
	})
}

//! Main entry point for the order tracking service.
//!
//! The binary loads the configuration, builds the order engine with the
//! configured storage and queue backends, and runs the queue consumers
//! alongside the HTTP API until interrupted.

use clap::Parser;
use order_config::{Config, ConfigError};
use order_core::{OrderEngine, OrderEngineBuilder, OrderFactories};
use order_queue::implementations::amqp::create_queue as create_amqp_queue;
use order_queue::implementations::memory::create_queue as create_memory_queue;
use order_storage::implementations::file::create_storage as create_file_storage;
use order_storage::implementations::memory::create_storage as create_memory_storage;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the order service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "ORDER_SERVICE_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started order service");

	let config_path = args.config.to_str().ok_or_else(|| {
		ConfigError::Validation(format!(
			"Configuration path is not valid UTF-8: {}",
			args.config.display()
		))
	})?;
	let config = Config::from_file(config_path).await.inspect_err(|e| {
		tracing::error!(error = %e, "Failed to load configuration");
	})?;
	tracing::info!("Loaded configuration [{}]", config.service.name);

	let engine = Arc::new(build_engine(config.clone())?);

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let runner = tokio::spawn({
				let engine = Arc::clone(&engine);
				async move { engine.run().await }
			});

			// Returns once the engine signals shutdown, or early if binding fails.
			let served = server::start_server(api_config, Arc::clone(&engine)).await;
			if let Err(e) = &served {
				tracing::error!(error = %e, "API server failed");
			}
			engine.shutdown();

			runner.await??;
			served?;
		},
		None => {
			tracing::info!("API disabled, running consumers only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped order service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the order engine with every compiled-in backend available.
fn build_engine(config: Config) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		order_storage::StorageInterface,
		order_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let queue_factories = create_factory_map!(
		order_queue::QueueInterface,
		order_queue::QueueError,
		"amqp" => create_amqp_queue,
		"memory" => create_memory_queue,
	);

	let factories = OrderFactories {
		storage_factories,
		queue_factories,
	};

	Ok(OrderEngineBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_args_defaults() {
		let args = Args::parse_from(["order-service"]);
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["order-service", "-c", "custom.toml", "-l", "debug"]);
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_create_factory_map_macro() {
		let factories = create_factory_map!(
			order_storage::StorageInterface,
			order_storage::StorageError,
			"memory" => create_memory_storage,
		);
		assert_eq!(factories.len(), 1);
		assert!(factories.contains_key("memory"));
	}

	#[tokio::test]
	async fn test_build_engine_from_file_config() {
		let dir = tempdir().unwrap();
		let storage_path = dir.path().join("storage");
		let config_path = dir.path().join("config.toml");
		std::fs::write(
			&config_path,
			format!(
				r#"
[service]
name = "orders-test"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"

[queue]
primary = "memory"
[queue.implementations.memory]
"#,
				storage_path.display()
			),
		)
		.unwrap();

		let config = Config::from_file(config_path.to_str().unwrap()).await.unwrap();
		let engine = build_engine(config).unwrap();
		assert_eq!(engine.config().service.name, "orders-test");

		let order = engine.order_handler().create().await.unwrap();
		assert!(storage_path
			.join(format!("orders.{}.json", order.id))
			.exists());
	}

	#[test]
	fn test_build_engine_rejects_unknown_primary() {
		let mut config = order_config::ConfigBuilder::new().build();
		config.storage.primary = "redis".to_string();

		assert!(build_engine(config).is_err());
	}
}

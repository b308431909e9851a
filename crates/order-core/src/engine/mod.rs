//! Order engine that owns the service context and the queue consumers.
//!
//! The engine is built once at startup and shared with the HTTP layer. It
//! runs one consumer task per consumed queue. On shutdown each consumer
//! finishes the message it is processing and stops taking new ones, then
//! the queue connection is closed.

use crate::handlers::{CompletionHandler, OrderHandler};
use crate::logs::{LogError, LogSink};
use crate::state::OrderStateMachine;
use order_config::Config;
use order_queue::{QueueMessage, QueueService};
use order_storage::StorageService;
use order_types::QueueName;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Service context shared by the HTTP handlers and the queue consumers.
#[derive(Clone)]
pub struct OrderEngine {
	/// Service configuration.
	pub(crate) config: Config,
	/// Queue service for work, completion and log messages.
	pub(crate) queue: Arc<QueueService>,
	/// Structured log sink
	pub(crate) logs: Arc<LogSink>,
	/// Order state machine
	pub(crate) state_machine: Arc<OrderStateMachine>,
	/// Order handler
	pub(crate) order_handler: Arc<OrderHandler>,
	/// Completion handler
	pub(crate) completion_handler: Arc<CompletionHandler>,
	shutdown: Arc<watch::Sender<bool>>,
}

impl OrderEngine {
	/// Creates an engine over the given storage and queue services.
	pub fn new(config: Config, storage: Arc<StorageService>, queue: Arc<QueueService>) -> Self {
		let logs = Arc::new(LogSink::new(storage.clone(), config.service.name.clone()));
		let state_machine = Arc::new(OrderStateMachine::new(storage));

		let order_handler = Arc::new(OrderHandler::new(
			state_machine.clone(),
			queue.clone(),
			logs.clone(),
		));

		let completion_handler = Arc::new(CompletionHandler::new(
			state_machine.clone(),
			queue.clone(),
			logs.clone(),
			config.consumer.failure_policy,
		));

		let (shutdown, _) = watch::channel(false);

		Self {
			config,
			queue,
			logs,
			state_machine,
			order_handler,
			completion_handler,
			shutdown: Arc::new(shutdown),
		}
	}

	/// Declares the queues, starts the consumers and runs until Ctrl+C or
	/// [`OrderEngine::shutdown`].
	///
	/// Shutdown is signalled on every exit path, so an engine that fails to
	/// start or loses a subscription also stops everything waiting on
	/// [`OrderEngine::stopped`]. The first error encountered is returned.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut consumers = Vec::new();
		let mut result = self.start_consumers(&mut consumers).await;

		if result.is_ok() {
			tracing::info!(service = %self.config.service.name, consumers = consumers.len(), "Order engine started");
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
				}
				_ = self.stopped() => {}
			}
		}

		self.shutdown();
		for consumer in consumers {
			let outcome = consumer
				.await
				.map_err(|e| EngineError::Service(format!("Consumer task failed: {}", e)))
				.and_then(|finished| finished);
			if let Err(e) = outcome {
				if result.is_ok() {
					result = Err(e);
				}
			}
		}

		if let Err(e) = self.queue.close().await {
			tracing::warn!(error = %e, "Failed to close queue connection");
			if result.is_ok() {
				result = Err(EngineError::Service(e.to_string()));
			}
		}

		match &result {
			Ok(()) => tracing::info!("Order engine stopped"),
			Err(e) => tracing::error!(error = %e, "Order engine stopped with error"),
		}
		result
	}

	/// Declares the queues and spawns one consumer per consumed queue.
	async fn start_consumers(
		&self,
		consumers: &mut Vec<JoinHandle<Result<(), EngineError>>>,
	) -> Result<(), EngineError> {
		self.queue
			.declare_all()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		let completions = self
			.queue
			.subscribe(QueueName::OrderDone)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		let handler = self.completion_handler.clone();
		consumers.push(self.spawn_consumer(QueueName::OrderDone, completions, move |message| {
			let handler = handler.clone();
			async move {
				if let Err(e) = handler.handle(&message).await {
					tracing::error!(error = %e, "Failed to settle completion message");
				}
			}
		}));

		if self.config.consumer.consume_logs {
			let entries = self
				.queue
				.subscribe(QueueName::SystemLogs)
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?;
			let logs = self.logs.clone();
			let queue = self.queue.clone();
			consumers.push(self.spawn_consumer(QueueName::SystemLogs, entries, move |message| {
				let logs = logs.clone();
				let queue = queue.clone();
				async move {
					match logs.ingest(&message.payload).await {
						Ok(_) => {},
						Err(LogError::Decode(e)) => {
							tracing::warn!(error = %e, "Discarding malformed log entry")
						},
						Err(e) => tracing::error!(error = %e, "Failed to store log entry"),
					}
					if let Err(e) = queue.ack(&message).await {
						tracing::error!(error = %e, "Failed to acknowledge log entry");
					}
				}
			}));
		}

		Ok(())
	}

	/// Signals the engine and its consumers to stop.
	pub fn shutdown(&self) {
		self.shutdown.send_replace(true);
	}

	/// Resolves once shutdown has been signalled.
	pub async fn stopped(&self) {
		let mut stop = self.shutdown.subscribe();
		while !*stop.borrow_and_update() {
			if stop.changed().await.is_err() {
				break;
			}
		}
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn logs(&self) -> &Arc<LogSink> {
		&self.logs
	}

	pub fn state_machine(&self) -> &Arc<OrderStateMachine> {
		&self.state_machine
	}

	pub fn order_handler(&self) -> &Arc<OrderHandler> {
		&self.order_handler
	}

	/// Spawns a task that feeds each delivery of `queue` to `handle`, one at
	/// a time, until shutdown.
	///
	/// A subscription that closes while the engine is running is an error:
	/// the task signals shutdown and reports it.
	fn spawn_consumer<F, Fut>(
		&self,
		queue: QueueName,
		mut receiver: mpsc::UnboundedReceiver<QueueMessage>,
		handle: F,
	) -> JoinHandle<Result<(), EngineError>>
	where
		F: Fn(QueueMessage) -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send,
	{
		let shutdown = self.shutdown.clone();
		let mut stop = shutdown.subscribe();
		tokio::spawn(async move {
			tracing::debug!(queue = %queue.as_str(), "Consumer started");
			loop {
				if *stop.borrow_and_update() {
					break;
				}
				tokio::select! {
					biased;
					_ = stop.changed() => break,
					delivery = receiver.recv() => match delivery {
						Some(message) => handle(message).await,
						None if *stop.borrow() => break,
						None => {
							tracing::error!(queue = %queue.as_str(), "Subscription closed while running");
							shutdown.send_replace(true);
							return Err(EngineError::Service(format!(
								"Subscription to '{}' closed",
								queue.as_str()
							)));
						},
					},
				}
			}
			tracing::debug!(queue = %queue.as_str(), "Consumer stopped");
			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use order_config::ConfigBuilder;
	use order_queue::implementations::memory::MemoryQueue;
	use order_queue::{QueueError, QueueInterface};
	use order_storage::implementations::memory::MemoryStorage;
	use order_types::{LogQuery, OrderStatus};
	use serde_json::json;
	use std::time::Duration;

	fn engine(config: Config) -> (OrderEngine, MemoryQueue) {
		let queue = MemoryQueue::new();
		let engine = OrderEngine::new(
			config,
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			Arc::new(QueueService::new(Box::new(queue.clone()))),
		);
		(engine, queue)
	}

	async fn eventually<F, Fut>(mut check: F)
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = bool>,
	{
		for _ in 0..200 {
			if check().await {
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("condition not reached");
	}

	#[tokio::test]
	async fn test_consumes_completions_until_shutdown() {
		let (engine, queue) = engine(ConfigBuilder::new().build());
		let runner = tokio::spawn({
			let engine = engine.clone();
			async move { engine.run().await }
		});

		let order = engine.order_handler().create().await.unwrap();
		queue
			.publish(
				"order_done",
				serde_json::to_vec(&json!({ "orderId": order.id, "dish": "Paella" })).unwrap(),
			)
			.await
			.unwrap();

		let machine = engine.state_machine().clone();
		let id = order.id.clone();
		eventually(|| {
			let machine = machine.clone();
			let id = id.clone();
			async move {
				machine.get_order(&id).await.unwrap().status() == OrderStatus::Completed
			}
		})
		.await;
		eventually(|| {
			let queue = queue.clone();
			async move { queue.unacked_count("order_done") == 0 }
		})
		.await;

		let summary = engine.order_handler().summary(order.id.as_str()).await.unwrap();
		assert_eq!(summary.status, OrderStatus::Completed);
		assert_eq!(summary.dish.as_deref(), Some("Paella"));
		assert!(summary.image.is_none());
		assert!(summary.description.is_none());
		assert!(summary.finished_at.is_some());

		let json = serde_json::to_value(&summary).unwrap();
		assert!(json["image"].is_null());
		assert!(json["description"].is_null());
		assert!(json["finishedAt"].is_string());

		engine.shutdown();
		runner.await.unwrap().unwrap();

		assert!(matches!(
			queue.publish("orders", b"{}".to_vec()).await,
			Err(QueueError::Closed)
		));
	}

	#[tokio::test]
	async fn test_mirrors_log_queue() {
		let (engine, queue) = engine(ConfigBuilder::new().build());
		let runner = tokio::spawn({
			let engine = engine.clone();
			async move { engine.run().await }
		});

		queue
			.publish(
				"system_logs",
				br#"{"service":"kitchen","level":"info","message":"Dish ready"}"#.to_vec(),
			)
			.await
			.unwrap();
		queue.publish("system_logs", b"garbage".to_vec()).await.unwrap();

		let logs = engine.logs().clone();
		eventually(|| {
			let logs = logs.clone();
			async move {
				let query = LogQuery {
					service: Some("kitchen".to_string()),
					..LogQuery::default()
				};
				logs.query(&query).await.unwrap().len() == 1
			}
		})
		.await;

		eventually(|| {
			let queue = queue.clone();
			async move { queue.unacked_count("system_logs") == 0 }
		})
		.await;

		engine.shutdown();
		runner.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_log_queue_left_alone_when_disabled() {
		let (engine, queue) = engine(ConfigBuilder::new().consume_logs(false).build());
		let runner = tokio::spawn({
			let engine = engine.clone();
			async move { engine.run().await }
		});

		queue
			.publish(
				"system_logs",
				br#"{"service":"kitchen","level":"info","message":"x"}"#.to_vec(),
			)
			.await
			.unwrap();
		engine.shutdown();
		runner.await.unwrap().unwrap();

		assert_eq!(queue.pending("system_logs").len(), 1);
	}

	#[tokio::test]
	async fn test_shutdown_before_run() {
		let (engine, _queue) = engine(ConfigBuilder::new().build());
		engine.shutdown();
		tokio::time::timeout(Duration::from_secs(1), engine.run())
			.await
			.unwrap()
			.unwrap();
	}

	#[tokio::test]
	async fn test_failed_start_signals_shutdown() {
		let (engine, queue) = engine(ConfigBuilder::new().build());
		queue.close().await.unwrap();

		let result = tokio::time::timeout(Duration::from_secs(1), engine.run())
			.await
			.unwrap();
		assert!(matches!(result, Err(EngineError::Service(_))));

		tokio::time::timeout(Duration::from_millis(500), engine.stopped())
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_closed_subscription_stops_engine() {
		let (engine, queue) = engine(ConfigBuilder::new().build());
		let runner = tokio::spawn({
			let engine = engine.clone();
			async move { engine.run().await }
		});

		// Wait until the completion consumer is live.
		let order = engine.order_handler().create().await.unwrap();
		queue
			.publish(
				"order_done",
				serde_json::to_vec(&json!({ "orderId": order.id, "dish": "Paella" })).unwrap(),
			)
			.await
			.unwrap();
		let machine = engine.state_machine().clone();
		let id = order.id.clone();
		eventually(|| {
			let machine = machine.clone();
			let id = id.clone();
			async move {
				machine.get_order(&id).await.unwrap().status() == OrderStatus::Completed
			}
		})
		.await;
		eventually(|| {
			let queue = queue.clone();
			async move { queue.unacked_count("order_done") == 0 }
		})
		.await;

		queue.close().await.unwrap();

		tokio::time::timeout(Duration::from_secs(1), engine.stopped())
			.await
			.unwrap();
		let result = tokio::time::timeout(Duration::from_secs(1), runner)
			.await
			.unwrap()
			.unwrap();
		assert!(matches!(result, Err(EngineError::Service(_))));
	}
}

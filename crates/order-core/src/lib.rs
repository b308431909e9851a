//! Core engine for the order tracking service.
//!
//! This crate ties the storage and queue backends together. It owns the order
//! lifecycle, publishes work to the kitchen, applies completions reported back
//! on the `order_done` queue and keeps the structured log collection.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod logs;
pub mod state;

#[cfg(test)]
mod test_support;

pub use builder::{BuilderError, OrderEngineBuilder, OrderFactories};
pub use engine::{EngineError, OrderEngine};
pub use handlers::{CompletionHandler, CompletionOutcome, OrderError, OrderHandler};
pub use logs::{LogError, LogSink};

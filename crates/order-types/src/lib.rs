//! Common types module for the order tracking service.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: the order entity and its lifecycle state, queue message
//! contracts, log entries, HTTP response shapes and configuration schema
//! validation. It performs no I/O.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Structured log entries and log query filters.
pub mod logs;
/// Queue names and message payloads exchanged with other services.
pub mod messages;
/// The order entity, its identifier and lifecycle state.
pub mod order;
/// Base trait for self-registering backend implementations.
pub mod registry;
/// Storage collection names.
pub mod storage;
/// Small formatting helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use logs::*;
pub use messages::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use utils::truncate_id;
pub use validation::*;

//! State management for orders.
//!
//! This module provides the state machine that owns every write to the
//! orders collection, ensuring valid status changes and keeping the
//! persisted document consistent with its status.

pub mod order;

pub use order::{CompletionUpdate, OrderStateError, OrderStateMachine};

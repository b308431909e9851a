//! Handlers for order requests and queue messages.
//!
//! The order handler serves creation and the read projections for the HTTP
//! API; the completion handler applies kitchen notifications from the
//! `order_done` queue.

pub mod completion;
pub mod order;

pub use completion::{Acknowledgement, CompletionError, CompletionHandler, CompletionOutcome};
pub use order::{OrderError, OrderHandler};

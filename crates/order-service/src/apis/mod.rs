//! Request handling for the order and log endpoints.

pub mod logs;
pub mod order;

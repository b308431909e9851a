//! Storage-related types for the order tracking service.

/// Collections persisted through the storage service.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order documents
	Orders,
	/// Structured log entries
	SystemLogs,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::SystemLogs => "system_logs",
		}
	}
}

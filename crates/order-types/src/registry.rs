//! Registry trait for self-registering backend implementations.

/// Base trait for implementation registries.
///
/// Each backend module (storage, queue) provides a `Registry` struct that
/// declares the name used for it in configuration files and its factory.
pub trait ImplementationRegistry {
	/// Name of the implementation in configuration, for example `memory`
	/// for `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	fn factory() -> Self::Factory;
}

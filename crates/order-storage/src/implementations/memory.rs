//! In-memory storage backend.
//!
//! Keeps documents in an ordered map for the lifetime of the process. Used
//! by tests and local development where persistence across restarts is not
//! required.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use order_types::{ConfigSchema, Schema, ValidationError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage implementation.
pub struct MemoryStorage {
	/// The in-memory store protected by a read-write lock.
	store: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(BTreeMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn insert_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		if store.contains_key(key) {
			return Err(StorageError::AlreadyExists(key.to_string()));
		}
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn replace_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		match store.get_mut(key) {
			Some(existing) => {
				*existing = value;
				Ok(())
			},
			None => Err(StorageError::NotFound),
		}
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.range(prefix.to_string()..)
			.take_while(|(key, _)| key.starts_with(prefix))
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
///
/// Memory storage takes no configuration parameters.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl order_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:abc";
		let value = b"{\"a\":1}".to_vec();
		storage.set_bytes(key, value.clone()).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);

		storage.set_bytes(key, b"{}".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"{}".to_vec());
		assert!(matches!(
			storage.get_bytes("orders:missing").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_insert_and_replace_semantics() {
		let storage = MemoryStorage::new();

		assert!(matches!(
			storage.replace_bytes("k", b"v1".to_vec()).await,
			Err(StorageError::NotFound)
		));

		storage.insert_bytes("k", b"v1".to_vec()).await.unwrap();
		assert!(matches!(
			storage.insert_bytes("k", b"v2".to_vec()).await,
			Err(StorageError::AlreadyExists(_))
		));

		storage.replace_bytes("k", b"v3".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v3".to_vec());
	}

	#[tokio::test]
	async fn test_scan_prefix_is_ordered_and_scoped() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:b", b"2".to_vec()).await.unwrap();
		storage.set_bytes("orders:a", b"1".to_vec()).await.unwrap();
		storage.set_bytes("ordersx:c", b"3".to_vec()).await.unwrap();
		storage.set_bytes("system_logs:a", b"4".to_vec()).await.unwrap();

		let keys: Vec<String> = storage
			.scan_prefix("orders:")
			.await
			.unwrap()
			.into_iter()
			.map(|(k, _)| k)
			.collect();
		assert_eq!(keys, vec!["orders:a", "orders:b"]);
	}

	#[test]
	fn test_factory_rejects_non_table_config() {
		assert!(create_storage(&toml::Value::Integer(1)).is_err());
	}
}

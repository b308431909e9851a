//! Storage module for the order tracking service.
//!
//! This module provides the persistence gateway for orders and log entries.
//! Backends implement a small byte-oriented key-value interface; the
//! [`StorageService`] layers typed JSON documents, namespaced keys and
//! identifier assignment on top of it.

use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry, ObjectId};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when creating an item whose key is already taken.
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Every write is atomic per key: a concurrent reader sees either the old
/// or the new value, never a partial one.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, creating or overwriting the key.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Stores raw bytes only if the key does not exist yet.
	///
	/// Returns `StorageError::AlreadyExists` otherwise.
	async fn insert_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Overwrites the value of an existing key.
	///
	/// Returns `StorageError::NotFound` if the key does not exist. The
	/// existence check and the write happen as one step.
	async fn replace_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Returns every key starting with `prefix` together with its value,
	/// ordered by key.
	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn document_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

/// High-level storage service that provides typed operations.
///
/// Documents live in namespaces (collections). The namespace and id are
/// combined to form the backend key, and values are stored as JSON.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&document_key(namespace, id), bytes).await
	}

	/// Inserts a new document under a freshly assigned identifier.
	///
	/// `build` receives the identifier so the document can embed it. The
	/// stored document is returned.
	pub async fn insert<T, F>(&self, namespace: &str, build: F) -> Result<T, StorageError>
	where
		T: Serialize,
		F: FnOnce(ObjectId) -> T,
	{
		let id = ObjectId::generate();
		let key = document_key(namespace, id.as_str());
		let document = build(id);
		let bytes =
			serde_json::to_vec(&document).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.insert_bytes(&key, bytes).await?;
		Ok(document)
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&document_key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves every document of a namespace, ordered by id.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = document_key(namespace, "");
		self.backend
			.scan_prefix(&prefix)
			.await?
			.into_iter()
			.map(|(_, bytes)| {
				serde_json::from_slice(&bytes)
					.map_err(|e| StorageError::Serialization(e.to_string()))
			})
			.collect()
	}

	/// Updates an existing value in storage.
	///
	/// Returns `StorageError::NotFound` if the document doesn't exist, making
	/// it semantically different from store() which will create or overwrite.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.replace_bytes(&document_key(namespace, id), bytes)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Doc {
		id: ObjectId,
		name: String,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_insert_assigns_id() {
		let storage = service();
		let doc = storage
			.insert("docs", |id| Doc {
				id,
				name: "first".to_string(),
			})
			.await
			.unwrap();

		let loaded: Doc = storage.retrieve("docs", doc.id.as_str()).await.unwrap();
		assert_eq!(loaded, doc);
	}

	#[tokio::test]
	async fn test_update_requires_existing_document() {
		let storage = service();
		let doc = Doc {
			id: ObjectId::generate(),
			name: "ghost".to_string(),
		};

		let result = storage.update("docs", doc.id.as_str(), &doc).await;
		assert!(matches!(result, Err(StorageError::NotFound)));
		assert!(matches!(
			storage.retrieve::<Doc>("docs", doc.id.as_str()).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_retrieve_all_is_scoped_to_namespace() {
		let storage = service();
		for name in ["a", "b"] {
			storage
				.insert("docs", |id| Doc {
					id,
					name: name.to_string(),
				})
				.await
				.unwrap();
		}
		storage
			.insert("other", |id| Doc {
				id,
				name: "c".to_string(),
			})
			.await
			.unwrap();

		let docs: Vec<Doc> = storage.retrieve_all("docs").await.unwrap();
		assert_eq!(docs.len(), 2);
		assert!(docs.iter().all(|d| d.name != "c"));
	}
}

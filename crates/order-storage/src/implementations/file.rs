//! File-based storage backend.
//!
//! Each document is a JSON file in a single directory. Namespace separators
//! in keys become dots in file names, so `orders:<id>` is stored as
//! `orders.<id>.json`. Writes go to a temporary file that is renamed into
//! place, and mutations are serialized through a lock so that the
//! check-then-write of `insert_bytes` and `replace_bytes` is atomic within
//! the process.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use order_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const EXTENSION: &str = "json";

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileStorage {
	/// Creates a new FileStorage instance rooted at `base_path`.
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	/// Converts a storage key to its file name without extension.
	///
	/// Keys may not contain path separators or dots.
	fn file_stem(key: &str) -> Result<String, StorageError> {
		if key.is_empty() || key.contains(['/', '\\', '.']) {
			return Err(StorageError::Backend(format!("Invalid storage key '{}'", key)));
		}
		Ok(key.replace(':', "."))
	}

	fn key_from_stem(stem: &str) -> String {
		stem.replace('.', ":")
	}

	fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		Ok(self
			.base_path
			.join(format!("{}.{}", Self::file_stem(key)?, EXTENSION)))
	}

	async fn write_atomic(&self, path: &Path, value: Vec<u8>) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let temp_path = path.with_extension(format!("{}.tmp", EXTENSION));
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn path_exists(path: &Path) -> Result<bool, StorageError> {
		fs::try_exists(path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key)?;

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key)?;
		let _guard = self.write_lock.lock().await;
		self.write_atomic(&path, value).await
	}

	async fn insert_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key)?;
		let _guard = self.write_lock.lock().await;
		if Self::path_exists(&path).await? {
			return Err(StorageError::AlreadyExists(key.to_string()));
		}
		self.write_atomic(&path, value).await
	}

	async fn replace_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key)?;
		let _guard = self.write_lock.lock().await;
		if !Self::path_exists(&path).await? {
			return Err(StorageError::NotFound);
		}
		self.write_atomic(&path, value).await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let stem_prefix = prefix.replace(':', ".");
		let suffix = format!(".{}", EXTENSION);

		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut results = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let file_name = entry.file_name();
			let Some(name) = file_name.to_str() else {
				continue;
			};
			let Some(stem) = name.strip_suffix(&suffix) else {
				continue;
			};
			if !stem.starts_with(&stem_prefix) {
				continue;
			}

			match fs::read(entry.path()).await {
				Ok(data) => results.push((Self::key_from_stem(stem), data)),
				// Removed between listing and reading.
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
				Err(e) => return Err(StorageError::Backend(e.to_string())),
			}
		}

		results.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(results)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("storage_path cannot be empty".to_string()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	tracing::debug!(path = %storage_path, "Using file storage");
	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl order_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage() -> (FileStorage, TempDir) {
		let dir = TempDir::new().unwrap();
		(FileStorage::new(dir.path().to_path_buf()), dir)
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let (storage, dir) = storage();

		let key = "orders:507f1f77bcf86cd799439011";
		storage.set_bytes(key, b"{}".to_vec()).await.unwrap();
		assert!(dir.path().join("orders.507f1f77bcf86cd799439011.json").exists());
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"{}".to_vec());
		assert!(!dir.path().join("orders.507f1f77bcf86cd799439011.json.tmp").exists());

		assert!(matches!(
			storage.get_bytes("orders:507f1f77bcf86cd799439012").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_insert_and_replace_semantics() {
		let (storage, _dir) = storage();

		assert!(matches!(
			storage.replace_bytes("orders:a", b"1".to_vec()).await,
			Err(StorageError::NotFound)
		));
		storage.insert_bytes("orders:a", b"1".to_vec()).await.unwrap();
		assert!(matches!(
			storage.insert_bytes("orders:a", b"2".to_vec()).await,
			Err(StorageError::AlreadyExists(_))
		));
		storage.replace_bytes("orders:a", b"3".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("orders:a").await.unwrap(), b"3".to_vec());
	}

	#[tokio::test]
	async fn test_scan_prefix() {
		let (storage, dir) = storage();
		storage.set_bytes("orders:b", b"2".to_vec()).await.unwrap();
		storage.set_bytes("orders:a", b"1".to_vec()).await.unwrap();
		storage.set_bytes("system_logs:x", b"3".to_vec()).await.unwrap();
		std::fs::write(dir.path().join("orders.stray.json.tmp"), b"partial").unwrap();

		let found = storage.scan_prefix("orders:").await.unwrap();
		assert_eq!(
			found,
			vec![
				("orders:a".to_string(), b"1".to_vec()),
				("orders:b".to_string(), b"2".to_vec()),
			]
		);
	}

	#[tokio::test]
	async fn test_scan_missing_directory_is_empty() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().join("not-created"));
		assert!(storage.scan_prefix("orders:").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_rejects_path_like_keys() {
		let (storage, _dir) = storage();
		assert!(storage.set_bytes("../escape", b"x".to_vec()).await.is_err());
		assert!(storage.get_bytes("orders/a").await.is_err());
	}

	#[test]
	fn test_schema_rejects_empty_path() {
		let config: toml::Value = toml::from_str("storage_path = \"\"").unwrap();
		assert!(FileStorageSchema.validate(&config).is_err());
	}
}

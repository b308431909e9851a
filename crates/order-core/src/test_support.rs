//! Storage double with switchable failures.

use async_trait::async_trait;
use order_storage::implementations::memory::MemoryStorage;
use order_storage::{StorageError, StorageInterface};
use order_types::ConfigSchema;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory storage whose reads and writes can be made to fail. Clones share
/// state, so a test can keep a handle after passing one to a service.
#[derive(Clone, Default)]
pub(crate) struct FlakyStorage {
	inner: Arc<MemoryStorage>,
	fail_reads: Arc<AtomicBool>,
	fail_writes: Arc<AtomicBool>,
	reads: Arc<AtomicUsize>,
}

impl FlakyStorage {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn fail_reads(&self, fail: bool) {
		self.fail_reads.store(fail, Ordering::SeqCst);
	}

	pub(crate) fn fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::SeqCst);
	}

	/// Number of read operations attempted so far.
	pub(crate) fn reads(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}

	fn check_read(&self) -> Result<(), StorageError> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		if self.fail_reads.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("read failure".into()));
		}
		Ok(())
	}

	fn check_write(&self) -> Result<(), StorageError> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("write failure".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl StorageInterface for FlakyStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.check_read()?;
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.check_write()?;
		self.inner.set_bytes(key, value).await
	}

	async fn insert_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.check_write()?;
		self.inner.insert_bytes(key, value).await
	}

	async fn replace_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.check_write()?;
		self.inner.replace_bytes(key, value).await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		self.check_read()?;
		self.inner.scan_prefix(prefix).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

//! Storage abstraction trait
//!
//! This module defines the FileStorage trait that all storage backends must implement.

use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store failed: {0}")]
    StoreFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed reader handed out by [`FileStorage::open`].
pub type FileReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Addressable byte storage for uploaded files.
///
/// Readers are streamed: callers never need the whole file in memory.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Write `data` at `storage_key`, replacing anything already there.
    async fn store(&self, storage_key: &str, data: Bytes) -> StorageResult<()>;

    /// Write everything `reader` yields at `storage_key`. Returns the byte count.
    async fn store_stream(&self, storage_key: &str, reader: FileReader) -> StorageResult<u64>;

    /// Open the file for streaming reads. `NotFound` when absent.
    async fn open(&self, storage_key: &str) -> StorageResult<FileReader>;

    /// Remove the file. Deleting a missing file is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;
}

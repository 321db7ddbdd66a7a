//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must
//! implement, and the error taxonomy shared by every backend.

use crate::file::FileHandle;
use async_trait::async_trait;
use std::pin::Pin;
use stowage_core::StorageKind;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The destination could not be opened or written. The source of the
    /// failed upload is left intact.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Orphanage operation attempted without an active session. A caller
    /// configuration error; never retried.
    #[error("An active session is required for orphanage uploads")]
    SessionRequired,

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A readable byte stream opened from a stored object.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// Storage abstraction trait
///
/// All storage backends (local filesystem, S3, object_store) must implement
/// this trait with identical observable behavior, so chunk storage, permanent
/// storage, and the orphanage can be driven through the same contract.
///
/// **Key format:** keys are backend-relative paths (`{path}/{name}`), joined
/// with `/` regardless of backend. Keys must not contain `..` or a leading `/`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload a file under `path.map(|p| format!("{p}/{name}"))` or `name`.
    ///
    /// Takes ownership of the source handle: on success the source object is
    /// consumed (temp file removed, or deleted from its previous backend) and
    /// a fresh handle for the destination key is returned. If the source
    /// already lives on this backend instance, the implementation may perform
    /// a native rename, but the result must be observably identical to
    /// copy-then-delete-source.
    ///
    /// On `WriteFailed` the source is left intact.
    async fn upload(
        &self,
        file: FileHandle,
        name: &str,
        path: Option<&str>,
    ) -> StorageResult<FileHandle>;

    /// Enumerate objects whose key starts at `prefix`. An empty prefix
    /// enumerates the whole backend root.
    ///
    /// An absent prefix (directory never created, no keys written) is not an
    /// error; it yields an empty vec.
    async fn get_files(&self, prefix: &str) -> StorageResult<Vec<FileHandle>>;

    /// Delete an object by key. Deleting a non-existent object is `Ok(())`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Open a readable byte stream for an object.
    async fn open_read(&self, key: &str) -> StorageResult<ByteReader>;

    /// The backend kind tag.
    fn kind(&self) -> StorageKind;

    /// Prefix for building externally resolvable references to stored files,
    /// if the deployment configured one.
    fn stream_prefix(&self) -> Option<&str>;
}

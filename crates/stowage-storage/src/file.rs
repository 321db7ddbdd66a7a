//! File handles
//!
//! A [`FileHandle`] is a snapshot of one stored object: its backend-relative
//! key, size, content type, and a capability to open a readable byte stream.
//! Handles are produced by every backend and consumed by `Storage::upload`,
//! which takes ownership so a source cannot be reused after it has been moved.

use crate::traits::{ByteReader, StorageError, StorageResult};
use std::path::{Path, PathBuf};
use tokio::fs;

#[cfg(feature = "storage-object-store")]
use object_store::ObjectStoreExt;
#[cfg(feature = "storage-object-store")]
use std::sync::Arc;

/// Where the bytes of a handle live, and how to reopen them.
#[derive(Debug)]
pub enum FileSource {
    /// A temporary file handed over by the request layer. Consumed (removed
    /// from disk) when the handle is uploaded.
    Temp(PathBuf),

    /// An object inside a local filesystem backend, addressed by absolute path.
    Local(PathBuf),

    /// An object held in an S3 bucket, addressed by absolute object key.
    #[cfg(feature = "storage-s3")]
    S3 {
        client: aws_sdk_s3::Client,
        bucket: String,
        key: String,
    },

    /// An object held by an object_store instance.
    #[cfg(feature = "storage-object-store")]
    ObjectStore {
        store: Arc<dyn object_store::ObjectStore>,
        location: object_store::path::Path,
    },
}

impl FileSource {
    /// Open a readable stream over the source bytes.
    pub async fn open(&self) -> StorageResult<ByteReader> {
        match self {
            FileSource::Temp(path) | FileSource::Local(path) => {
                let file = fs::File::open(path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        StorageError::NotFound(path.display().to_string())
                    } else {
                        StorageError::ReadFailed(format!(
                            "Failed to open {}: {}",
                            path.display(),
                            e
                        ))
                    }
                })?;
                Ok(Box::pin(file))
            }

            #[cfg(feature = "storage-s3")]
            FileSource::S3 {
                client,
                bucket,
                key,
            } => {
                let response = client
                    .get_object()
                    .bucket(bucket.as_str())
                    .key(key.as_str())
                    .send()
                    .await
                    .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
                Ok(Box::pin(response.body.into_async_read()))
            }

            #[cfg(feature = "storage-object-store")]
            FileSource::ObjectStore { store, location } => {
                use futures::TryStreamExt;

                let result = store.get(location).await.map_err(|e| match e {
                    object_store::Error::NotFound { .. } => {
                        StorageError::NotFound(location.to_string())
                    }
                    other => StorageError::ReadFailed(other.to_string()),
                })?;
                let stream = result
                    .into_stream()
                    .map_err(|e| std::io::Error::other(e.to_string()));
                Ok(Box::pin(tokio_util::io::StreamReader::new(stream)))
            }
        }
    }

    /// Remove the source object from its original location. Called once a
    /// successful upload has copied the bytes elsewhere.
    pub(crate) async fn discard(self) -> StorageResult<()> {
        match self {
            FileSource::Temp(path) | FileSource::Local(path) => {
                match fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(StorageError::DeleteFailed(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    ))),
                }
            }

            #[cfg(feature = "storage-s3")]
            FileSource::S3 {
                client,
                bucket,
                key,
            } => {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
                Ok(())
            }

            #[cfg(feature = "storage-object-store")]
            FileSource::ObjectStore { store, location } => match store.delete(&location).await {
                Ok(()) => Ok(()),
                Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
            },
        }
    }
}

/// A stored object snapshot.
///
/// Immutable once constructed; it does not track later external mutation of
/// the underlying object.
#[derive(Debug)]
pub struct FileHandle {
    key: String,
    size: u64,
    content_type: Option<String>,
    source: FileSource,
}

impl FileHandle {
    pub fn new(
        key: impl Into<String>,
        size: u64,
        content_type: Option<String>,
        source: FileSource,
    ) -> Self {
        FileHandle {
            key: key.into(),
            size,
            content_type,
            source,
        }
    }

    /// Build a handle for a temp file handed over by the request layer.
    ///
    /// Size comes from file metadata; content type is inferred from the
    /// extension.
    pub async fn from_temp_file(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::ReadFailed(format!("Failed to stat {}: {}", path.display(), e))
            }
        })?;

        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))?;
        let content_type = guess_content_type(&key);

        Ok(FileHandle {
            key,
            size: meta.len(),
            content_type,
            source: FileSource::Temp(path),
        })
    }

    /// Backend-relative path or object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The final path segment of the key.
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub(crate) fn into_source(self) -> FileSource {
        self.source
    }

    /// Open a readable stream over the object bytes.
    pub async fn open(&self) -> StorageResult<ByteReader> {
        self.source.open().await
    }
}

/// Infer a MIME type from a filename extension.
pub fn guess_content_type(name: &str) -> Option<String> {
    let ext = name.rsplit('.').next()?;
    let mime = match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        _ => return None,
    };
    Some(mime.to_string())
}

/// True when `path` is located under `base`.
pub(crate) fn path_is_under(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

use crate::copier;
use crate::file::{guess_content_type, path_is_under, FileHandle, FileSource};
use crate::keys;
use crate::traits::{ByteReader, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use stowage_core::StorageKind;
use tokio::fs;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    buffer_size: usize,
    stream_prefix: Option<String>,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/stowage/uploads")
    /// * `buffer_size` - Streaming copy buffer size in bytes
    /// * `stream_prefix` - Optional prefix for externally resolvable references
    pub async fn new(
        base_path: impl Into<PathBuf>,
        buffer_size: usize,
        stream_prefix: Option<String>,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            buffer_size,
            stream_prefix,
        })
    }

    /// Convert storage key to filesystem path with traversal validation.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if !keys::validate_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to create parent directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Key of `path` relative to the storage root.
    fn path_to_key(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.base_path)
            .ok()
            .map(|rel| rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        file: FileHandle,
        name: &str,
        path: Option<&str>,
    ) -> StorageResult<FileHandle> {
        let key = keys::join_key(path, name);
        let dest = self.key_to_path(&key)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&dest).await?;

        // Source already on this backend: a rename is observably identical to
        // copy-then-delete-source.
        if let FileSource::Local(src) = file.source() {
            if path_is_under(src, &self.base_path) {
                let src = src.clone();
                fs::rename(&src, &dest).await.map_err(|e| {
                    StorageError::WriteFailed(format!(
                        "Failed to move {} to {}: {}",
                        src.display(),
                        dest.display(),
                        e
                    ))
                })?;

                tracing::info!(
                    key = %key,
                    size_bytes = file.size(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage move successful"
                );

                return Ok(FileHandle::new(
                    key,
                    file.size(),
                    file.content_type().map(str::to_string),
                    FileSource::Local(dest),
                ));
            }
        }

        let mut reader = file.open().await?;
        let mut out = fs::File::create(&dest).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create file {}: {}", dest.display(), e))
        })?;

        let copied = copier::copy(&mut reader, &mut out, self.buffer_size).await?;

        out.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to sync file {}: {}", dest.display(), e))
        })?;
        drop(reader);

        let content_type = file.content_type().map(str::to_string);
        file.into_source().discard().await?;

        tracing::info!(
            key = %key,
            size_bytes = copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(FileHandle::new(
            key,
            copied,
            content_type,
            FileSource::Local(dest),
        ))
    }

    async fn get_files(&self, prefix: &str) -> StorageResult<Vec<FileHandle>> {
        // An empty prefix enumerates the whole backend root.
        let root = if prefix.is_empty() {
            self.base_path.clone()
        } else {
            self.key_to_path(prefix)?
        };

        let mut handles = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // Absence of the prefix is the expected no-uploads-yet case.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::ReadFailed(format!(
                        "Failed to list {}: {}",
                        dir.display(),
                        e
                    )))
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to list {}: {}", dir.display(), e))
            })? {
                let entry_path = entry.path();
                let meta = entry.metadata().await.map_err(|e| {
                    StorageError::ReadFailed(format!(
                        "Failed to stat {}: {}",
                        entry_path.display(),
                        e
                    ))
                })?;

                if meta.is_dir() {
                    pending.push(entry_path);
                } else if let Some(key) = self.path_to_key(&entry_path) {
                    let content_type = guess_content_type(&key);
                    handles.push(FileHandle::new(
                        key,
                        meta.len(),
                        content_type,
                        FileSource::Local(entry_path),
                    ));
                }
            }
        }

        // Directory traversal order is not stable across platforms; sort so
        // repeated enumerations agree.
        handles.sort_by(|a, b| a.key().cmp(b.key()));

        Ok(handles)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn open_read(&self, key: &str) -> StorageResult<ByteReader> {
        let path = self.key_to_path(key)?;

        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::ReadFailed(format!("Failed to open {}: {}", path.display(), e))
            }
        })?;

        Ok(Box::pin(file))
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    fn stream_prefix(&self) -> Option<&str> {
        self.stream_prefix.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::constants::DEFAULT_BUFFER_SIZE;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, DEFAULT_BUFFER_SIZE, None)
            .await
            .unwrap()
    }

    async fn temp_upload(dir: &Path, name: &str, data: &[u8]) -> FileHandle {
        let path = dir.join(name);
        fs::write(&path, data).await.unwrap();
        FileHandle::from_temp_file(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_consumes_source_and_is_enumerable() {
        let inbox = tempdir().unwrap();
        let root = tempdir().unwrap();
        let storage = storage(root.path()).await;

        let file = temp_upload(inbox.path(), "photo.png", b"png data").await;
        let temp_path = inbox.path().join("photo.png");

        let stored = storage
            .upload(file, "photo.png", Some("uploads/gallery"))
            .await
            .unwrap();

        assert_eq!(stored.key(), "uploads/gallery/photo.png");
        assert_eq!(stored.size(), 8);
        assert!(!temp_path.exists(), "source temp file must be consumed");

        let listed = storage.get_files("uploads/gallery").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key(), "uploads/gallery/photo.png");
        assert_eq!(listed[0].size(), 8);
    }

    #[tokio::test]
    async fn test_same_backend_upload_moves() {
        let inbox = tempdir().unwrap();
        let root = tempdir().unwrap();
        let storage = storage(root.path()).await;

        let file = temp_upload(inbox.path(), "a.txt", b"contents").await;
        let staged = storage.upload(file, "a.txt", Some("staging")).await.unwrap();

        let moved = storage
            .upload(staged, "a.txt", Some("final"))
            .await
            .unwrap();

        assert_eq!(moved.key(), "final/a.txt");
        assert!(storage.get_files("staging").await.unwrap().is_empty());

        let mut reader = storage.open_read("final/a.txt").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"contents");
    }

    #[tokio::test]
    async fn test_get_files_absent_prefix_is_empty() {
        let root = tempdir().unwrap();
        let storage = storage(root.path()).await;

        let listed = storage.get_files("never/written").await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let root = tempdir().unwrap();
        let storage = storage(root.path()).await;

        let result = storage.open_read("../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let root = tempdir().unwrap();
        let storage = storage(root.path()).await;

        assert!(storage.delete("nonexistent/file.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_upload_preserves_source() {
        let inbox = tempdir().unwrap();
        let root = tempdir().unwrap();
        let storage = storage(root.path()).await;

        let file = temp_upload(inbox.path(), "keep.txt", b"data").await;

        // Invalid destination key: upload must fail before touching the source.
        let result = storage.upload(file, "keep.txt", Some("../outside")).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(inbox.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_enumeration_is_sorted() {
        let inbox = tempdir().unwrap();
        let root = tempdir().unwrap();
        let storage = storage(root.path()).await;

        for name in ["b.txt", "a.txt", "c.txt"] {
            let file = temp_upload(inbox.path(), name, b"x").await;
            storage.upload(file, name, Some("batch")).await.unwrap();
        }

        let listed = storage.get_files("batch").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|h| h.key().to_string()).collect();
        assert_eq!(keys, ["batch/a.txt", "batch/b.txt", "batch/c.txt"]);
    }
}

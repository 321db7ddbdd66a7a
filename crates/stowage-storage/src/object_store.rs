use crate::file::{guess_content_type, FileHandle, FileSource};
use crate::keys;
use crate::traits::{ByteReader, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::prefix::PrefixStore;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload, WriteMultipart};
use std::sync::Arc;
use stowage_core::StorageKind;
use tokio::io::AsyncReadExt;

// Files above this size are shipped through a multipart upload.
const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Storage backed by any [`object_store::ObjectStore`] implementation.
///
/// Covers providers the dedicated S3 backend does not: local filesystem
/// through the same interface, in-memory stores for tests, and any
/// S3-compatible service `object_store` can talk to.
#[derive(Clone)]
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    key_prefix: Option<String>,
    buffer_size: usize,
    stream_prefix: Option<String>,
}

impl ObjectStoreStorage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        key_prefix: Option<String>,
        buffer_size: usize,
        stream_prefix: Option<String>,
    ) -> Self {
        ObjectStoreStorage {
            store,
            key_prefix,
            buffer_size,
            stream_prefix,
        }
    }

    /// Build a store from a location URL.
    ///
    /// Supported forms:
    /// * `file:///var/lib/stowage` or a bare path - local filesystem
    /// * `s3://bucket/prefix` - S3, credentials from the environment
    /// * `memory://` - in-memory store
    pub fn from_url(
        url: &str,
        buffer_size: usize,
        stream_prefix: Option<String>,
    ) -> StorageResult<Self> {
        let store: Arc<dyn ObjectStore> = if url == "memory://" {
            Arc::new(InMemory::new())
        } else if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, prefix) = match rest.split_once('/') {
                Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(StorageError::ConfigError(format!(
                    "Missing bucket in object store URL: {}",
                    url
                )));
            }

            let s3 = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| {
                    StorageError::ConfigError(format!("Failed to build S3 store: {}", e))
                })?;

            if prefix.is_empty() {
                Arc::new(s3)
            } else {
                Arc::new(PrefixStore::new(s3, ObjectPath::from(prefix)))
            }
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            std::fs::create_dir_all(path).map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    path, e
                ))
            })?;
            let fs = LocalFileSystem::new_with_prefix(path).map_err(|e| {
                StorageError::ConfigError(format!("Failed to open {}: {}", path, e))
            })?;
            Arc::new(fs)
        };

        Ok(Self::new(store, None, buffer_size, stream_prefix))
    }

    /// Scope every key under `key_prefix`.
    pub fn with_key_prefix(mut self, key_prefix: Option<String>) -> Self {
        self.key_prefix = key_prefix;
        self
    }

    fn full_key(&self, key: &str) -> String {
        match self.key_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), key)
            }
            _ => key.to_string(),
        }
    }

    fn handle(&self, key: String, location: ObjectPath, size: u64) -> FileHandle {
        let content_type = guess_content_type(&key);
        FileHandle::new(
            key,
            size,
            content_type,
            FileSource::ObjectStore {
                store: Arc::clone(&self.store),
                location,
            },
        )
    }

    async fn put_buffered(
        &self,
        location: &ObjectPath,
        mut reader: ByteReader,
        expected_size: u64,
    ) -> StorageResult<u64> {
        let mut buffer = Vec::with_capacity(expected_size as usize);
        let mut chunk = vec![0u8; self.buffer_size.max(1)];

        loop {
            let n = reader.read(&mut chunk).await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read from source: {}", e))
            })?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
        }

        let size = buffer.len() as u64;
        self.store
            .put(location, PutPayload::from(Bytes::from(buffer)))
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        Ok(size)
    }

    async fn put_multipart(
        &self,
        location: &ObjectPath,
        mut reader: ByteReader,
    ) -> StorageResult<u64> {
        let upload = self
            .store
            .put_multipart(location)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        let mut write = WriteMultipart::new(upload);

        let mut chunk = vec![0u8; self.buffer_size.max(1)];
        let mut written = 0u64;

        loop {
            let n = reader.read(&mut chunk).await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read from source: {}", e))
            })?;
            if n == 0 {
                break;
            }
            write.write(&chunk[..n]);
            written += n as u64;
        }

        write
            .finish()
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        Ok(written)
    }
}

#[async_trait]
impl Storage for ObjectStoreStorage {
    async fn upload(
        &self,
        file: FileHandle,
        name: &str,
        path: Option<&str>,
    ) -> StorageResult<FileHandle> {
        let key = keys::join_key(path, name);
        if !keys::validate_key(&key) {
            return Err(StorageError::InvalidKey(key));
        }
        let location = ObjectPath::from(self.full_key(&key).as_str());
        let start = std::time::Instant::now();

        // Source already held by this store: a rename is observably identical
        // to copy-then-delete-source.
        if let FileSource::ObjectStore {
            store: src_store,
            location: src_location,
        } = file.source()
        {
            if Arc::ptr_eq(src_store, &self.store) {
                let src_location = src_location.clone();
                self.store
                    .rename(&src_location, &location)
                    .await
                    .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

                tracing::info!(
                    key = %key,
                    size_bytes = file.size(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object store move successful"
                );

                return Ok(self.handle(key, location, file.size()));
            }
        }

        let reader = file.open().await?;
        let size = if file.size() > MULTIPART_THRESHOLD {
            self.put_multipart(&location, reader).await?
        } else {
            self.put_buffered(&location, reader, file.size()).await?
        };

        file.into_source().discard().await?;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store upload successful"
        );

        Ok(self.handle(key, location, size))
    }

    async fn get_files(&self, prefix: &str) -> StorageResult<Vec<FileHandle>> {
        let full_prefix = self.full_key(prefix);
        let full_prefix = full_prefix.trim_matches('/');
        // An empty prefix enumerates the whole store.
        let list_prefix = (!full_prefix.is_empty()).then(|| ObjectPath::from(full_prefix));

        let mut stream = self.store.list(list_prefix.as_ref());
        let mut handles = Vec::new();

        while let Some(result) = stream.next().await {
            let meta = result.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            let full_key = meta.location.to_string();
            let key = match self.key_prefix.as_deref() {
                Some(p) => keys::strip_prefix(&full_key, p).to_string(),
                None => full_key,
            };
            handles.push(self.handle(key, meta.location, meta.size as u64));
        }

        // Listing order is provider-specific; sort so repeated enumerations
        // agree.
        handles.sort_by(|a, b| a.key().cmp(b.key()));

        Ok(handles)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if !keys::validate_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let location = ObjectPath::from(self.full_key(key).as_str());

        match self.store.delete(&location).await {
            Ok(()) => {
                tracing::info!(key = %key, "Object store delete successful");
                Ok(())
            }
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    async fn open_read(&self, key: &str) -> StorageResult<ByteReader> {
        if !keys::validate_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let location = ObjectPath::from(self.full_key(key).as_str());

        let source = FileSource::ObjectStore {
            store: Arc::clone(&self.store),
            location,
        };
        match source.open().await {
            Err(StorageError::NotFound(_)) => Err(StorageError::NotFound(key.to_string())),
            other => other,
        }
    }

    fn kind(&self) -> StorageKind {
        StorageKind::ObjectStore
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

    fn memory_storage() -> ObjectStoreStorage {
        ObjectStoreStorage::new(Arc::new(InMemory::new()), None, DEFAULT_BUFFER_SIZE, None)
    }

    async fn temp_upload(dir: &std::path::Path, name: &str, data: &[u8]) -> FileHandle {
        let path = dir.join(name);
        tokio::fs::write(&path, data).await.unwrap();
        FileHandle::from_temp_file(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_consumes_source_and_is_enumerable() {
        let inbox = tempdir().unwrap();
        let storage = memory_storage();

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
    }

    #[tokio::test]
    async fn test_same_store_upload_moves() {
        let inbox = tempdir().unwrap();
        let storage = memory_storage();

        let file = temp_upload(inbox.path(), "a.txt", b"contents").await;
        let staged = storage.upload(file, "a.txt", Some("staging")).await.unwrap();

        let moved = storage.upload(staged, "a.txt", Some("final")).await.unwrap();

        assert_eq!(moved.key(), "final/a.txt");
        assert!(storage.get_files("staging").await.unwrap().is_empty());

        let mut reader = storage.open_read("final/a.txt").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"contents");
    }

    #[tokio::test]
    async fn test_get_files_absent_prefix_is_empty() {
        let storage = memory_storage();
        let listed = storage.get_files("never/written").await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let storage = memory_storage();
        assert!(storage.delete("nonexistent/file.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_open_read_missing_is_not_found() {
        let storage = memory_storage();
        let result = storage.open_read("absent.bin").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_key_prefix_is_applied_and_stripped() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let storage = ObjectStoreStorage::new(
            Arc::clone(&store),
            Some("tenant-a".to_string()),
            DEFAULT_BUFFER_SIZE,
            None,
        );

        let inbox = tempdir().unwrap();
        let file = temp_upload(inbox.path(), "a.txt", b"x").await;
        storage.upload(file, "a.txt", Some("docs")).await.unwrap();

        // The physical object carries the prefix.
        let raw = store
            .get(&ObjectPath::from("tenant-a/docs/a.txt"))
            .await
            .unwrap();
        assert_eq!(raw.bytes().await.unwrap().as_ref(), b"x");

        // Enumeration reports keys without it.
        let listed = storage.get_files("docs").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key(), "docs/a.txt");
    }

    #[tokio::test]
    async fn test_from_url_memory() {
        let storage = ObjectStoreStorage::from_url("memory://", DEFAULT_BUFFER_SIZE, None).unwrap();
        assert_eq!(storage.kind(), StorageKind::ObjectStore);
        assert!(storage.get_files("x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_url_local_filesystem() {
        let root = tempdir().unwrap();
        let url = root.path().to_string_lossy().to_string();
        let storage = ObjectStoreStorage::from_url(&url, DEFAULT_BUFFER_SIZE, None).unwrap();

        let inbox = tempdir().unwrap();
        let file = temp_upload(inbox.path(), "b.txt", b"data").await;
        storage.upload(file, "b.txt", Some("sub")).await.unwrap();

        assert!(root.path().join("sub/b.txt").exists());
    }
}

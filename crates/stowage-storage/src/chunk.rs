//! Chunk storage role.
//!
//! Large uploads arrive in pieces and are reassembled by an upstream
//! component. The pieces live under a dedicated directory inside a regular
//! backend; this wrapper pins that directory and shares the backend handle
//! with the orphanage, so one set of credentials serves both roles.

use crate::file::FileHandle;
use crate::keys;
use crate::traits::{Storage, StorageResult};
use std::sync::Arc;

#[derive(Clone)]
pub struct ChunkStorage {
    backend: Arc<dyn Storage>,
    directory: String,
}

impl ChunkStorage {
    /// Wrap `backend` with chunk pieces scoped under `directory`.
    ///
    /// An empty `directory` means the backend itself is rooted at the chunk
    /// area (the local-filesystem case); remote backends scope by key prefix
    /// instead.
    pub fn new(backend: Arc<dyn Storage>, directory: impl Into<String>) -> Self {
        ChunkStorage {
            backend,
            directory: directory.into().trim_matches('/').to_string(),
        }
    }

    /// The underlying backend handle, shared with the orphanage.
    pub fn backend(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.backend)
    }

    /// Root of the chunk area inside the backend.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    fn scoped(&self, path: Option<&str>) -> String {
        if self.directory.is_empty() {
            return path.unwrap_or_default().to_string();
        }
        match path {
            Some(p) if !p.is_empty() => keys::join_key(Some(&self.directory), p),
            _ => self.directory.clone(),
        }
    }

    /// Store one chunk under `{directory}/{path}/{name}`.
    pub async fn upload(
        &self,
        file: FileHandle,
        name: &str,
        path: Option<&str>,
    ) -> StorageResult<FileHandle> {
        let scope = self.scoped(path);
        let scope = (!scope.is_empty()).then_some(scope);
        self.backend.upload(file, name, scope.as_deref()).await
    }

    /// Enumerate chunks under `{directory}/{prefix}`.
    pub async fn get_files(&self, prefix: &str) -> StorageResult<Vec<FileHandle>> {
        self.backend.get_files(&self.scoped(Some(prefix))).await
    }

    /// Delete one chunk by its directory-relative key.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.backend.delete(&self.scoped(Some(key))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStorage;
    use stowage_core::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_DIRECTORY};
    use tempfile::tempdir;

    async fn chunk_storage(root: &std::path::Path) -> ChunkStorage {
        let backend = LocalStorage::new(root, DEFAULT_BUFFER_SIZE, None)
            .await
            .unwrap();
        ChunkStorage::new(Arc::new(backend), DEFAULT_CHUNK_DIRECTORY)
    }

    async fn temp_upload(dir: &std::path::Path, name: &str, data: &[u8]) -> FileHandle {
        let path = dir.join(name);
        tokio::fs::write(&path, data).await.unwrap();
        FileHandle::from_temp_file(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_chunks_are_scoped_to_directory() {
        let inbox = tempdir().unwrap();
        let root = tempdir().unwrap();
        let chunks = chunk_storage(root.path()).await;

        let file = temp_upload(inbox.path(), "part_0", b"piece").await;
        let stored = chunks.upload(file, "part_0", Some("upload-42")).await.unwrap();

        assert_eq!(stored.key(), "chunks/upload-42/part_0");
        assert!(root.path().join("chunks/upload-42/part_0").exists());

        let listed = chunks.get_files("upload-42").await.unwrap();
        assert_eq!(listed.len(), 1);

        chunks.delete("upload-42/part_0").await.unwrap();
        assert!(chunks.get_files("upload-42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_directory_uses_backend_root() {
        let inbox = tempdir().unwrap();
        let root = tempdir().unwrap();
        let backend = LocalStorage::new(root.path(), DEFAULT_BUFFER_SIZE, None)
            .await
            .unwrap();
        let chunks = ChunkStorage::new(Arc::new(backend), "");

        let file = temp_upload(inbox.path(), "part_0", b"piece").await;
        let stored = chunks.upload(file, "part_0", Some("upload-7")).await.unwrap();

        assert_eq!(stored.key(), "upload-7/part_0");
        assert!(root.path().join("upload-7/part_0").exists());
    }
}

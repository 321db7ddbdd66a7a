//! Session orphanage.
//!
//! Files uploaded before the user is fully authenticated are staged under a
//! per-session prefix inside the chunk backend. Once the session is promoted,
//! `upload_files` reconciles the staged set into permanent storage. Every
//! staging path is `{staging_root}/{session_id}/{mapping}/{name}`, so two
//! sessions can never observe each other's files.

use crate::chunk::ChunkStorage;
use crate::file::FileHandle;
use crate::keys;
use crate::traits::{ByteReader, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;
use stowage_core::{SessionContext, StorageKind};

/// Outcome of one batch migration.
///
/// Migration never propagates an error; per-file failures are recorded here
/// and the corresponding files remain staged for a later retry.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Handles in permanent storage, one per migrated file.
    pub migrated: Vec<FileHandle>,
    /// Staging-relative name and cause for each file that failed to migrate.
    pub failed: Vec<(String, StorageError)>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Staging area for uploads that arrive without an authenticated session.
pub struct OrphanageStorage {
    target: Arc<dyn Storage>,
    staging: Arc<dyn Storage>,
    staging_root: String,
    mapping: String,
    session: Arc<dyn SessionContext>,
}

impl OrphanageStorage {
    /// Compose an orphanage for one mapping.
    ///
    /// Staged files live inside the chunk storage's backend, so the orphanage
    /// shares that adapter handle instead of holding its own credentials.
    pub fn new(
        target: Arc<dyn Storage>,
        chunks: &ChunkStorage,
        session: Arc<dyn SessionContext>,
        staging_root: impl Into<String>,
        mapping: impl Into<String>,
    ) -> Self {
        OrphanageStorage {
            target,
            staging: chunks.backend(),
            staging_root: staging_root.into(),
            mapping: mapping.into(),
            session,
        }
    }

    /// The session/mapping staging prefix. Refused without an active session,
    /// before anything is written.
    fn staging_prefix(&self) -> StorageResult<String> {
        if !self.session.is_active() {
            return Err(StorageError::SessionRequired);
        }
        Ok(format!(
            "{}/{}/{}",
            self.staging_root,
            self.session.id(),
            self.mapping
        ))
    }

    /// Migrate staged files into permanent storage.
    ///
    /// When `files` is `None` the current staging set is enumerated first.
    /// Never returns an error: an enumeration failure yields an empty report,
    /// a per-file upload failure is recorded in `failed` and leaves that file
    /// staged.
    pub async fn upload_files(&self, files: Option<Vec<FileHandle>>) -> MigrationReport {
        let prefix = match self.staging_prefix() {
            Ok(prefix) => prefix,
            Err(e) => {
                tracing::warn!(
                    mapping = %self.mapping,
                    error = %e,
                    "Orphanage migration skipped"
                );
                return MigrationReport::default();
            }
        };

        let files = match files {
            Some(files) => files,
            None => match self.staging.get_files(&prefix).await {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!(
                        mapping = %self.mapping,
                        prefix = %prefix,
                        error = %e,
                        "Failed to enumerate staged files"
                    );
                    return MigrationReport::default();
                }
            },
        };

        let mut report = MigrationReport::default();

        for file in files {
            let name = keys::strip_prefix(file.key(), &prefix).to_string();

            match self.target.upload(file, &name, None).await {
                Ok(handle) => report.migrated.push(handle),
                Err(e) => {
                    tracing::warn!(
                        mapping = %self.mapping,
                        name = %name,
                        error = %e,
                        "Failed to migrate staged file"
                    );
                    report.failed.push((name, e));
                }
            }
        }

        tracing::info!(
            mapping = %self.mapping,
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            "Orphanage migration finished"
        );

        report
    }
}

/// Mappings configured with `use_orphanage` hand controllers this same trait
/// object; the caller-supplied path is ignored and every operation is scoped
/// to the session/mapping staging prefix.
#[async_trait]
impl Storage for OrphanageStorage {
    async fn upload(
        &self,
        file: FileHandle,
        name: &str,
        _path: Option<&str>,
    ) -> StorageResult<FileHandle> {
        let prefix = self.staging_prefix()?;
        self.staging.upload(file, name, Some(&prefix)).await
    }

    async fn get_files(&self, prefix: &str) -> StorageResult<Vec<FileHandle>> {
        let scope = self.staging_prefix()?;
        let effective = if prefix.is_empty() {
            scope
        } else {
            keys::join_key(Some(&scope), prefix)
        };
        self.staging.get_files(&effective).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let prefix = self.staging_prefix()?;
        self.staging.delete(&keys::join_key(Some(&prefix), key)).await
    }

    async fn open_read(&self, key: &str) -> StorageResult<ByteReader> {
        let prefix = self.staging_prefix()?;
        self.staging.open_read(&keys::join_key(Some(&prefix), key)).await
    }

    fn kind(&self) -> StorageKind {
        self.staging.kind()
    }

    fn stream_prefix(&self) -> Option<&str> {
        self.staging.stream_prefix()
    }
}

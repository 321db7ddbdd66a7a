//! Configuration-driven construction of storage backends.

#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-object-store")]
use crate::ObjectStoreStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{ChunkStorage, OrphanageStorage, Storage, StorageError, StorageResult};
use std::sync::Arc;
use stowage_core::{ChunkConfig, Config, MappingConfig, SessionContext, StorageKind};

/// Create the permanent storage backend for one mapping.
pub async fn create_storage(mapping: &MappingConfig) -> StorageResult<Arc<dyn Storage>> {
    match mapping.kind {
        #[cfg(feature = "storage-local")]
        StorageKind::Local => {
            let directory = mapping.directory.clone().ok_or_else(|| {
                StorageError::ConfigError(format!(
                    "Mapping '{}': local storage requires a directory",
                    mapping.name
                ))
            })?;

            let storage =
                LocalStorage::new(directory, mapping.buffer_size, mapping.stream_prefix.clone())
                    .await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageKind::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-s3")]
        StorageKind::S3 => {
            let bucket = mapping.s3_bucket.clone().ok_or_else(|| {
                StorageError::ConfigError(format!(
                    "Mapping '{}': S3 storage requires a bucket",
                    mapping.name
                ))
            })?;
            let region = mapping
                .s3_region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string());

            let storage = S3Storage::new(
                bucket,
                region,
                mapping.s3_endpoint.clone(),
                mapping.key_prefix.clone(),
                mapping.buffer_size,
                mapping.stream_prefix.clone(),
            )
            .await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageKind::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-object-store")]
        StorageKind::ObjectStore => {
            let url = mapping.object_store_url.clone().ok_or_else(|| {
                StorageError::ConfigError(format!(
                    "Mapping '{}': object_store storage requires a store URL",
                    mapping.name
                ))
            })?;

            let storage =
                ObjectStoreStorage::from_url(&url, mapping.buffer_size, mapping.stream_prefix.clone())?
                    .with_key_prefix(mapping.key_prefix.clone());
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-object-store"))]
        StorageKind::ObjectStore => Err(StorageError::ConfigError(
            "object_store storage backend not available (storage-object-store feature not enabled)"
                .to_string(),
        )),
    }
}

/// Create the chunk storage from the shared chunk configuration.
///
/// The local backend is rooted directly at the chunk directory; remote
/// backends scope chunk keys by it instead, so the directory doubles as the
/// key prefix inside the bucket or store.
pub async fn create_chunk_storage(config: &Config) -> StorageResult<ChunkStorage> {
    let chunks: &ChunkConfig = &config.chunks;

    match chunks.kind {
        #[cfg(feature = "storage-local")]
        StorageKind::Local => {
            let backend = LocalStorage::new(
                chunks.directory.clone(),
                chunks.buffer_size,
                chunks.stream_prefix.clone(),
            )
            .await?;
            Ok(ChunkStorage::new(Arc::new(backend), ""))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageKind::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-s3")]
        StorageKind::S3 => {
            let bucket = chunks.s3_bucket.clone().ok_or_else(|| {
                StorageError::ConfigError("Chunk storage on S3 requires a bucket".to_string())
            })?;
            let region = chunks
                .s3_region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string());

            let backend = S3Storage::new(
                bucket,
                region,
                chunks.s3_endpoint.clone(),
                None,
                chunks.buffer_size,
                chunks.stream_prefix.clone(),
            )
            .await?;
            Ok(ChunkStorage::new(Arc::new(backend), chunks.directory.clone()))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageKind::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-object-store")]
        StorageKind::ObjectStore => {
            let url = chunks.object_store_url.clone().ok_or_else(|| {
                StorageError::ConfigError(
                    "Chunk storage on object_store requires a store URL".to_string(),
                )
            })?;

            let backend = ObjectStoreStorage::from_url(
                &url,
                chunks.buffer_size,
                chunks.stream_prefix.clone(),
            )?;
            Ok(ChunkStorage::new(Arc::new(backend), chunks.directory.clone()))
        }

        #[cfg(not(feature = "storage-object-store"))]
        StorageKind::ObjectStore => Err(StorageError::ConfigError(
            "object_store storage backend not available (storage-object-store feature not enabled)"
                .to_string(),
        )),
    }
}

/// Compose the orphanage for one mapping on top of its permanent storage and
/// the shared chunk backend.
pub fn create_orphanage(
    target: Arc<dyn Storage>,
    chunks: &ChunkStorage,
    session: Arc<dyn SessionContext>,
    config: &Config,
    mapping_name: &str,
) -> OrphanageStorage {
    OrphanageStorage::new(
        target,
        chunks,
        session,
        config.orphanage.directory.clone(),
        mapping_name,
    )
}

/// Create the storage a controller should write through for one mapping.
///
/// Mappings with `use_orphanage` get the orphanage wrapper, everything else
/// the permanent backend directly.
pub async fn create_mapping_storage(
    config: &Config,
    mapping_name: &str,
    chunks: &ChunkStorage,
    session: Arc<dyn SessionContext>,
) -> StorageResult<Arc<dyn Storage>> {
    let mapping = config.mapping(mapping_name).ok_or_else(|| {
        StorageError::ConfigError(format!("Unknown mapping '{}'", mapping_name))
    })?;

    let target = create_storage(mapping).await?;
    if mapping.use_orphanage {
        Ok(Arc::new(create_orphanage(
            target,
            chunks,
            session,
            config,
            mapping_name,
        )))
    } else {
        Ok(target)
    }
}

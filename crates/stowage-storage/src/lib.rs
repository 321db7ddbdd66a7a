//! Stowage Storage Library
//!
//! This crate provides the storage abstraction for upload handling: the
//! [`Storage`] trait, backend implementations for the local filesystem, S3,
//! and `object_store`, the chunk storage role, and the session orphanage
//! that stages uploads until their session is authenticated.
//!
//! # Storage key format
//!
//! Keys are backend-relative paths joined with `/`, identical across
//! backends: permanent files live at `{mapping_root}/{name}`, staged orphans
//! at `{staging_root}/{session_id}/{mapping}/{name}`. Keys must not contain
//! `..` or a leading `/`. Key handling is centralized in the `keys` module so
//! all backends stay consistent.

pub mod chunk;
pub mod copier;
pub mod factory;
pub mod file;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-object-store")]
pub mod object_store;
pub mod orphanage;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use chunk::ChunkStorage;
pub use factory::{create_chunk_storage, create_mapping_storage, create_orphanage, create_storage};
pub use file::{FileHandle, FileSource};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-object-store")]
pub use self::object_store::ObjectStoreStorage;
pub use orphanage::{MigrationReport, OrphanageStorage};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use stowage_core::StorageKind;
pub use traits::{ByteReader, Storage, StorageError, StorageResult};

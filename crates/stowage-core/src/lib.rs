//! Stowage Core Library
//!
//! This crate provides the configuration structures, backend-kind tags, and
//! session context shared across all stowage components. It performs no I/O;
//! backend implementations live in the stowage-storage crate.

pub mod config;
pub mod constants;
pub mod session;
pub mod storage_types;

// Re-export commonly used types
pub use config::{ChunkConfig, Config, MappingConfig, OrphanageConfig};
pub use session::{FixedSession, SessionContext};
pub use storage_types::StorageKind;

//! Shared constants.

/// Default buffer size for streaming copies between backends, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Default staging root for orphaned uploads inside the chunk backend.
pub const DEFAULT_ORPHANAGE_DIRECTORY: &str = "orphanage";

/// Default root for in-flight chunk data.
pub const DEFAULT_CHUNK_DIRECTORY: &str = "chunks";

/// Default maximum age in seconds before the external sweep may reclaim
/// staged orphans and stale chunks.
pub const DEFAULT_MAX_AGE_SECS: u64 = 7 * 24 * 3600;

//! Configuration module
//!
//! This module provides configuration structures for upload mappings, chunk
//! storage, and the orphanage. A mapping describes one logical upload target
//! (one frontend endpoint maps to one mapping); the chunk and orphanage
//! sections are shared across mappings.

use std::env;

use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_DIRECTORY, DEFAULT_MAX_AGE_SECS,
    DEFAULT_ORPHANAGE_DIRECTORY,
};
use crate::storage_types::StorageKind;

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Configuration for one upload mapping.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct MappingConfig {
    /// Mapping name, used as the mapping-type tag in orphanage staging paths.
    pub name: String,
    pub kind: StorageKind,
    /// Root directory for the local backend.
    pub directory: Option<String>,
    /// Bucket for the S3 backend.
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    pub s3_endpoint: Option<String>,
    /// Key prefix inside the bucket / object store.
    pub key_prefix: Option<String>,
    /// URL for the object_store backend (e.g. "s3://bucket").
    pub object_store_url: Option<String>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Prefix for building externally resolvable references to stored files.
    pub stream_prefix: Option<String>,
    #[serde(default)]
    pub use_orphanage: bool,
}

/// Configuration for the chunk storage backend.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct ChunkConfig {
    pub kind: StorageKind,
    pub directory: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub object_store_url: Option<String>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    pub stream_prefix: Option<String>,
    /// Maximum age in seconds before the external sweep may reclaim stale chunks.
    pub max_age_secs: u64,
}

/// Configuration for the orphanage staging area.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct OrphanageConfig {
    /// Staging root inside the chunk backend. Session-scoped paths are built
    /// underneath it.
    pub directory: String,
    /// Maximum age in seconds before the external sweep may reclaim
    /// never-finalized orphans.
    pub max_age_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    pub mappings: Vec<MappingConfig>,
    pub chunks: ChunkConfig,
    pub orphanage: OrphanageConfig,
}

impl Config {
    /// Load a configuration from the environment.
    ///
    /// This covers the common single-mapping deployment; richer setups
    /// deserialize a `Config` from a JSON document instead.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let kind: StorageKind = env::var("STORAGE_KIND")
            .unwrap_or_else(|_| "local".to_string())
            .parse()?;

        let buffer_size = env::var("STORAGE_BUFFER_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BUFFER_SIZE);

        let mapping = MappingConfig {
            name: env::var("STORAGE_MAPPING_NAME").unwrap_or_else(|_| "uploads".to_string()),
            kind,
            directory: env::var("STORAGE_DIRECTORY").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or_else(|| env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            key_prefix: env::var("STORAGE_KEY_PREFIX").ok(),
            object_store_url: env::var("OBJECT_STORE_URL").ok(),
            buffer_size,
            stream_prefix: env::var("STORAGE_STREAM_PREFIX").ok(),
            use_orphanage: env::var("USE_ORPHANAGE")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
        };

        let chunks = ChunkConfig {
            kind,
            directory: env::var("CHUNK_DIRECTORY")
                .unwrap_or_else(|_| DEFAULT_CHUNK_DIRECTORY.to_string()),
            s3_bucket: mapping.s3_bucket.clone(),
            s3_region: mapping.s3_region.clone(),
            s3_endpoint: mapping.s3_endpoint.clone(),
            object_store_url: mapping.object_store_url.clone(),
            buffer_size,
            stream_prefix: mapping.stream_prefix.clone(),
            max_age_secs: env::var("CHUNK_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_AGE_SECS),
        };

        let orphanage = OrphanageConfig {
            directory: env::var("ORPHANAGE_DIRECTORY")
                .unwrap_or_else(|_| DEFAULT_ORPHANAGE_DIRECTORY.to_string()),
            max_age_secs: env::var("ORPHANAGE_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_AGE_SECS),
        };

        let config = Config {
            mappings: vec![mapping],
            chunks,
            orphanage,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.mappings.is_empty() {
            return Err(anyhow::anyhow!("At least one upload mapping must be configured"));
        }

        for mapping in &self.mappings {
            if mapping.buffer_size == 0 {
                return Err(anyhow::anyhow!(
                    "Mapping '{}': buffer_size must be non-zero",
                    mapping.name
                ));
            }
            match mapping.kind {
                StorageKind::Local if mapping.directory.is_none() => {
                    return Err(anyhow::anyhow!(
                        "Mapping '{}': local storage requires a directory",
                        mapping.name
                    ));
                }
                StorageKind::S3 if mapping.s3_bucket.is_none() => {
                    return Err(anyhow::anyhow!(
                        "Mapping '{}': S3 storage requires a bucket",
                        mapping.name
                    ));
                }
                StorageKind::ObjectStore if mapping.object_store_url.is_none() => {
                    return Err(anyhow::anyhow!(
                        "Mapping '{}': object_store storage requires a store URL",
                        mapping.name
                    ));
                }
                _ => {}
            }
        }

        if self.orphanage.directory.is_empty() {
            return Err(anyhow::anyhow!("Orphanage directory must not be empty"));
        }

        Ok(())
    }

    pub fn mapping(&self, name: &str) -> Option<&MappingConfig> {
        self.mappings.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_mapping(name: &str) -> MappingConfig {
        MappingConfig {
            name: name.to_string(),
            kind: StorageKind::Local,
            directory: Some("/tmp/uploads".to_string()),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            key_prefix: None,
            object_store_url: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            stream_prefix: None,
            use_orphanage: false,
        }
    }

    fn base_config() -> Config {
        Config {
            mappings: vec![local_mapping("gallery")],
            chunks: ChunkConfig {
                kind: StorageKind::Local,
                directory: "/tmp/chunks".to_string(),
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
                object_store_url: None,
                buffer_size: DEFAULT_BUFFER_SIZE,
                stream_prefix: None,
                max_age_secs: DEFAULT_MAX_AGE_SECS,
            },
            orphanage: OrphanageConfig {
                directory: DEFAULT_ORPHANAGE_DIRECTORY.to_string(),
                max_age_secs: DEFAULT_MAX_AGE_SECS,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_local_mapping_requires_directory() {
        let mut config = base_config();
        config.mappings[0].directory = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_s3_mapping_requires_bucket() {
        let mut config = base_config();
        config.mappings[0].kind = StorageKind::S3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mapping_lookup() {
        let config = base_config();
        assert!(config.mapping("gallery").is_some());
        assert!(config.mapping("missing").is_none());
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let json = r#"{
            "mappings": [{
                "name": "gallery",
                "kind": "local",
                "directory": "/var/lib/stowage/uploads",
                "use_orphanage": true
            }],
            "chunks": {
                "kind": "local",
                "directory": "/var/lib/stowage/chunks",
                "max_age_secs": 604800
            },
            "orphanage": {
                "directory": "orphanage",
                "max_age_secs": 604800
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.mappings[0].use_orphanage);
        assert_eq!(config.mappings[0].buffer_size, DEFAULT_BUFFER_SIZE);
    }
}

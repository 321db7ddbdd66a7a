use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend kinds
///
/// This enum tags the available backend implementations. It's defined in core
/// because it's used in configuration before any backend is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
    ObjectStore,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "s3" => Ok(StorageKind::S3),
            "object_store" | "object-store" => Ok(StorageKind::ObjectStore),
            _ => Err(anyhow::anyhow!("Invalid storage kind: {}", s)),
        }
    }
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageKind::Local => write!(f, "local"),
            StorageKind::S3 => write!(f, "s3"),
            StorageKind::ObjectStore => write!(f, "object_store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [StorageKind::Local, StorageKind::S3, StorageKind::ObjectStore] {
            assert_eq!(kind.to_string().parse::<StorageKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_invalid_kind_rejected() {
        assert!("ftp".parse::<StorageKind>().is_err());
    }
}

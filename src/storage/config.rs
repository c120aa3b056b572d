//! Configuration for blob storage backends

use crate::error::Result;
use crate::storage::{local_store::LocalFsBlobStore, mock_store::MockBlobStore, BlobStore};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available blob storage backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum StorageBackend {
    #[default]
    LocalFs,
    Mock,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "localfs" | "local" | "fs" => Ok(StorageBackend::LocalFs),
            "mock" | "memory" => Ok(StorageBackend::Mock),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Blob storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Directory holding object bodies and their metadata
    pub base_path: String,
    /// Directory for in-flight uploads before they are renamed into place
    pub temp_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            base_path: "./data/objects".to_string(),
            temp_path: "./data/temp".to_string(),
        }
    }
}

impl StorageConfig {
    /// Create a blob store instance based on the configuration
    pub fn create_store(&self) -> Result<Arc<dyn BlobStore>> {
        match self.backend {
            StorageBackend::LocalFs => {
                info!(
                    "Using local filesystem blob store with base_path: {}, temp_path: {}",
                    self.base_path, self.temp_path
                );
                Ok(Arc::new(LocalFsBlobStore::open(self)?))
            }
            StorageBackend::Mock => {
                info!("Using in-memory blob store");
                Ok(Arc::new(MockBlobStore::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("localfs".parse::<StorageBackend>().unwrap(), StorageBackend::LocalFs);
        assert_eq!("LocalFs".parse::<StorageBackend>().unwrap(), StorageBackend::LocalFs);
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::LocalFs);
        assert_eq!("mock".parse::<StorageBackend>().unwrap(), StorageBackend::Mock);
        assert_eq!("MEMORY".parse::<StorageBackend>().unwrap(), StorageBackend::Mock);

        assert!("s3".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_create_store() {
        let dir = tempfile::tempdir().unwrap();
        let local_config = StorageConfig {
            backend: StorageBackend::LocalFs,
            base_path: dir.path().join("objects").display().to_string(),
            temp_path: dir.path().join("temp").display().to_string(),
        };
        let mock_config = StorageConfig {
            backend: StorageBackend::Mock,
            ..Default::default()
        };

        assert!(local_config.create_store().is_ok());
        assert!(mock_config.create_store().is_ok());
    }
}

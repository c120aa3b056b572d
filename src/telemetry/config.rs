//! Configuration for usage counter backends

use crate::error::Result;
use crate::telemetry::{mock_store::MockUsageStore, sqlite_store::SQLiteUsageStore, UsageStore};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available usage counter backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum TelemetryBackend {
    #[default]
    SQLite,
    Mock,
}

impl std::str::FromStr for TelemetryBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(TelemetryBackend::SQLite),
            "mock" => Ok(TelemetryBackend::Mock),
            _ => Err(format!("Unknown telemetry backend: {}", s)),
        }
    }
}

/// Usage telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Counter backend type
    pub backend: TelemetryBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
    /// Record hits on served files
    pub enabled: bool,
    /// Upper bound on draining queued hits at shutdown, in seconds
    pub drain_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            backend: TelemetryBackend::default(),
            db_path: "./data/usage.db".to_string(),
            wal_mode: true,
            enabled: true,
            drain_timeout_secs: 10,
        }
    }
}

impl TelemetryConfig {
    /// Create a usage store instance based on the configuration
    pub fn create_store(&self) -> Result<Arc<dyn UsageStore>> {
        match self.backend {
            TelemetryBackend::SQLite => {
                info!(
                    "Using SQLite usage store with db_path: {}, wal_mode: {}",
                    self.db_path, self.wal_mode
                );
                Ok(Arc::new(SQLiteUsageStore::open(self)?))
            }
            TelemetryBackend::Mock => {
                info!("Using in-memory usage store");
                Ok(Arc::new(MockUsageStore::new()))
            }
        }
    }
}

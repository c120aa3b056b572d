//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.

use std::sync::Arc;
use log::info;
use tokio::task::JoinHandle;

use crate::access::AccessGate;
use crate::config::AppConfig;
use crate::error::Result;
use crate::service::path_policy::PathPolicy;
use crate::service::telemetry::{start_telemetry, TelemetryAggregator};
use crate::service::FileService;
use crate::storage::BlobStore;
use crate::telemetry::UsageStore;

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub file_service: Arc<FileService>,
    pub usage_store: Arc<dyn UsageStore>,
    pub telemetry: TelemetryAggregator,
    pub gate: Arc<dyn AccessGate>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state with stores configured from YAML config.
    /// Must run inside a tokio runtime; returns the telemetry worker handle
    /// when telemetry is enabled.
    pub fn from_config(config: AppConfig) -> Result<(Self, Option<JoinHandle<()>>)> {
        info!("Initializing application state with configuration");

        let blob_store = config.storage.create_store()?;
        let usage_store = config.telemetry.create_store()?;
        let state = Self::with_stores(config, blob_store, usage_store);

        info!("Application state initialized successfully");
        Ok(state)
    }

    /// Assemble state around existing stores
    pub fn with_stores(
        config: AppConfig,
        blob_store: Arc<dyn BlobStore>,
        usage_store: Arc<dyn UsageStore>,
    ) -> (Self, Option<JoinHandle<()>>) {
        let policy = Arc::new(PathPolicy::new(&config.policy));
        let file_service = Arc::new(FileService::new(blob_store, policy));
        let gate = config.access.create_gate();

        let (telemetry, worker) = if config.telemetry.enabled {
            let (aggregator, worker) = start_telemetry(Arc::clone(&usage_store));
            (aggregator, Some(worker))
        } else {
            info!("Usage telemetry disabled");
            (TelemetryAggregator::disabled(), None)
        };

        (
            Self {
                file_service,
                usage_store,
                telemetry,
                gate,
                config,
            },
            worker,
        )
    }

    /// Create application state for testing with mock backends; the
    /// telemetry worker runs detached
    pub fn new_for_testing() -> Self {
        let config = AppConfig::for_testing();
        let blob_store: Arc<dyn BlobStore> = Arc::new(crate::storage::mock_store::MockBlobStore::new());
        let usage_store: Arc<dyn UsageStore> = Arc::new(crate::telemetry::mock_store::MockUsageStore::new());
        Self::with_stores(config, blob_store, usage_store).0
    }
}

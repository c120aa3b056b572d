//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use log::{info, warn};

use crate::access::AccessConfig;
use crate::service::path_policy::PolicyConfig;
use crate::storage::config::StorageConfig;
use crate::telemetry::config::TelemetryConfig;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "FLAT_DRIVE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Blob store configuration
    pub storage: StorageConfig,
    /// Usage counter configuration
    pub telemetry: TelemetryConfig,
    /// Key visibility policy
    pub policy: PolicyConfig,
    /// Administrative API access
    pub access: AccessConfig,
    /// Values exposed to the web front end
    pub site: SiteConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Where this configuration came from, reported once logging is up
    #[serde(skip)]
    pub origin: ConfigOrigin,
}

/// Source of a loaded configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConfigOrigin {
    /// Built in code
    #[default]
    Defaults,
    /// Read from this file
    File(String),
    /// This file was named but absent, defaults used
    Missing(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Maximum payload size in bytes
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9710,
            workers: 4,
            max_payload_size: 1073741824, // 1GB
        }
    }
}

/// Deployment values echoed to the front end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Environment name, e.g. `production` or `dev`
    pub environment: String,
    pub api_base: String,
    pub cdn_base: String,
    /// Key of the document served at `/`
    pub index_document: String,
    /// Cache-Control sent with served blobs
    pub cache_control: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            api_base: "/api".to_string(),
            cdn_base: String::new(),
            index_document: "index.html".to_string(),
            cache_control: "public, max-age=31536000, immutable".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

fn env_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl AppConfig {
    /// Load configuration from file, use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from(config_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path)?;
            let mut config = Self::from_yaml(&content)?;
            config.origin = ConfigOrigin::File(config_path.to_string());
            Ok(config)
        } else {
            Ok(Self {
                origin: ConfigOrigin::Missing(config_path.to_string()),
                ..Self::default()
            })
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// `STORAGE_BACKEND`, `TELEMETRY_BACKEND` and `FLAT_DRIVE_DEV_MODE` win over the file
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Ok(backend) = std::env::var("TELEMETRY_BACKEND") {
            self.telemetry.backend = backend.parse()?;
        }
        if let Ok(dev_mode) = std::env::var("FLAT_DRIVE_DEV_MODE") {
            self.access.dev_mode = env_flag(&dev_mode);
        }
        Ok(())
    }

    /// Report the config source and effective backends. Loading happens
    /// before the logger exists, so this is called after `logging::init`.
    pub fn log_summary(&self) {
        match &self.origin {
            ConfigOrigin::File(path) => info!("Loaded configuration from {}", path),
            ConfigOrigin::Missing(path) => warn!("Config file {} not found, using defaults", path),
            ConfigOrigin::Defaults => info!("Using built-in configuration"),
        }
        info!(
            "Storage backend {:?}, telemetry backend {:?}",
            self.storage.backend, self.telemetry.backend
        );
        if self.access.dev_mode {
            warn!("Development mode: /api is open without an access assertion");
        }
    }

    /// Development configuration: open API, in-memory stores
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.storage.backend = crate::storage::config::StorageBackend::Mock;
        config.telemetry.backend = crate::telemetry::config::TelemetryBackend::Mock;
        config.access.dev_mode = true;
        config.site.environment = "dev".to_string();
        config
    }
}

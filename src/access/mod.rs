//! Access control for the administrative API
//!
//! Authentication happens upstream; a gate only checks whether the request
//! carries the upstream's assertion. Development mode allows everything.

pub mod middleware;

use actix_web::HttpRequest;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Header set by the access proxy in front of the service
pub const DEFAULT_TRUSTED_HEADER: &str = "Cf-Access-Jwt-Assertion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerdict {
    Allow,
    Deny,
}

/// What a gate gets to look at
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    /// Header names lowercased
    headers: HashMap<String, String>,
}

impl RequestMeta {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn from_request(req: &HttpRequest) -> Self {
        let mut meta = Self::new(req.method().as_str(), req.path());
        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                meta.headers.insert(name.as_str().to_lowercase(), value.to_string());
            }
        }
        meta
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

pub trait AccessGate: Send + Sync {
    fn verify(&self, meta: &RequestMeta) -> AccessVerdict;

    fn name(&self) -> &'static str;
}

/// Allows requests carrying a non-empty trusted header
pub struct TrustedHeaderGate {
    header: String,
}

impl TrustedHeaderGate {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl AccessGate for TrustedHeaderGate {
    fn verify(&self, meta: &RequestMeta) -> AccessVerdict {
        match meta.header(&self.header) {
            Some(value) if !value.trim().is_empty() => AccessVerdict::Allow,
            _ => {
                warn!("Missing {} header on {} {}", self.header, meta.method, meta.path);
                AccessVerdict::Deny
            }
        }
    }

    fn name(&self) -> &'static str {
        "trusted-header"
    }
}

/// Allows everything
pub struct DevModeGate;

impl AccessGate for DevModeGate {
    fn verify(&self, _meta: &RequestMeta) -> AccessVerdict {
        AccessVerdict::Allow
    }

    fn name(&self) -> &'static str {
        "dev-mode"
    }
}

/// Access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Skip the trusted header check
    pub dev_mode: bool,
    /// Header the access proxy sets on authenticated requests
    pub trusted_header: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            trusted_header: DEFAULT_TRUSTED_HEADER.to_string(),
        }
    }
}

impl AccessConfig {
    pub fn create_gate(&self) -> Arc<dyn AccessGate> {
        if self.dev_mode {
            warn!("Development mode: administrative API is open");
            Arc::new(DevModeGate)
        } else {
            info!("Administrative API requires the {} header", self.trusted_header);
            Arc::new(TrustedHeaderGate::new(self.trusted_header.clone()))
        }
    }
}

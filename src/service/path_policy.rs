//! Key visibility policy

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Reserved names and blocked prefixes, per deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Keys hidden only on exact match
    pub reserved_names: Vec<String>,
    /// Keys hidden when they start with any of these
    pub blocked_prefixes: Vec<String>,
    /// Hide zero-byte objects (directory placeholders) from listings
    pub hide_empty_objects: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reserved_names: vec!["index.html".to_string()],
            blocked_prefixes: vec![
                ".".to_string(),
                "_".to_string(),
                "private/".to_string(),
                "internal/".to_string(),
            ],
            hide_empty_objects: true,
        }
    }
}

/// Decides whether a key or prefix is hidden from listing and serving.
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    reserved_names: HashSet<String>,
    blocked_prefixes: Vec<String>,
    hide_empty_objects: bool,
}

impl PathPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            reserved_names: config.reserved_names.iter().cloned().collect(),
            // an empty prefix would match every key
            blocked_prefixes: config
                .blocked_prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            hide_empty_objects: config.hide_empty_objects,
        }
    }

    pub fn is_blocked(&self, key: &str) -> bool {
        self.reserved_names.contains(key)
            || self.blocked_prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
    }

    pub fn hides_empty_objects(&self) -> bool {
        self.hide_empty_objects
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

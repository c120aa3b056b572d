//! Usage Counter Storage Layer Abstraction
//!
//! Durable per-file access counters keyed by `(file, site, page)`, with the
//! aggregate reads used by the usage summary endpoints.

pub mod config;
pub mod mock_store;
pub mod sqlite_store;


use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successful serve of a file
#[derive(Debug, Clone, PartialEq)]
pub struct UsageHit {
    pub file: String,
    pub site: String,
    pub page: String,
    pub at: DateTime<Utc>,
}

/// Counter row for one `(file, site, page)` identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageRecord {
    pub file: String,
    pub site: String,
    pub page: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Summed count for one file across all referrers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileTotal {
    pub file: String,
    pub total: u64,
}

/// Trait defining the usage counter store interface
pub trait UsageStore: Send + Sync {
    /// Insert the identity with count 1, or increment it and overwrite `last_seen`
    fn record_hit(&self, hit: &UsageHit) -> Result<()>;

    /// Files ordered by summed count, highest first
    fn top_files(&self, limit: usize) -> Result<Vec<FileTotal>>;

    /// Records ordered by `last_seen`, newest first
    fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>>;

    /// Sum of every counter
    fn total_hits(&self) -> Result<u64>;

    /// Every record for one file, highest count first
    fn file_usage(&self, file: &str) -> Result<Vec<UsageRecord>>;
}

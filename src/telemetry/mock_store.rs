//! Mock implementation of UsageStore for testing

use crate::error::{Result, VfsError};
use crate::telemetry::{FileTotal, UsageHit, UsageRecord, UsageStore};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type Identity = (String, String, String);

/// In-memory UsageStore
pub struct MockUsageStore {
    records: Mutex<HashMap<Identity, UsageRecord>>,
}

impl MockUsageStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct `(file, site, page)` rows
    pub fn record_count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<Identity, UsageRecord>>> {
        self.records
            .lock()
            .map_err(|_| VfsError::backend("usage map lock poisoned"))
    }
}

impl Default for MockUsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageStore for MockUsageStore {
    fn record_hit(&self, hit: &UsageHit) -> Result<()> {
        let mut records = self.records()?;
        let identity = (hit.file.clone(), hit.site.clone(), hit.page.clone());
        records
            .entry(identity)
            .and_modify(|record| {
                record.count += 1;
                record.last_seen = hit.at;
            })
            .or_insert_with(|| UsageRecord {
                file: hit.file.clone(),
                site: hit.site.clone(),
                page: hit.page.clone(),
                count: 1,
                last_seen: hit.at,
            });
        Ok(())
    }

    fn top_files(&self, limit: usize) -> Result<Vec<FileTotal>> {
        let records = self.records()?;
        let mut totals: HashMap<&str, u64> = HashMap::new();
        for record in records.values() {
            *totals.entry(record.file.as_str()).or_insert(0) += record.count;
        }

        let mut totals: Vec<FileTotal> = totals
            .into_iter()
            .map(|(file, total)| FileTotal {
                file: file.to_string(),
                total,
            })
            .collect();
        totals.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.file.cmp(&b.file)));
        totals.truncate(limit);
        Ok(totals)
    }

    fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>> {
        let mut records: Vec<UsageRecord> = self.records()?.values().cloned().collect();
        records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        records.truncate(limit);
        Ok(records)
    }

    fn total_hits(&self) -> Result<u64> {
        Ok(self.records()?.values().map(|r| r.count).sum())
    }

    fn file_usage(&self, file: &str) -> Result<Vec<UsageRecord>> {
        let mut records: Vec<UsageRecord> = self
            .records()?
            .values()
            .filter(|r| r.file == file)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| b.last_seen.cmp(&a.last_seen)));
        Ok(records)
    }
}

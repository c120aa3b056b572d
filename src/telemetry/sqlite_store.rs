//! SQLite implementation of UsageStore

use crate::error::{Result, VfsError};
use crate::telemetry::config::TelemetryConfig;
use crate::telemetry::{FileTotal, UsageHit, UsageRecord, UsageStore};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS file_usage (
    file TEXT NOT NULL,
    site TEXT NOT NULL,
    page TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    last_seen INTEGER NOT NULL,
    PRIMARY KEY (file, site, page)
)";

const UPSERT: &str = "INSERT INTO file_usage (file, site, page, count, last_seen)
    VALUES (?1, ?2, ?3, 1, ?4)
    ON CONFLICT(file, site, page)
    DO UPDATE SET
        count = count + 1,
        last_seen = excluded.last_seen";

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<UsageRecord> {
    let count: i64 = row.get(3)?;
    let last_seen: i64 = row.get(4)?;
    Ok(UsageRecord {
        file: row.get(0)?,
        site: row.get(1)?,
        page: row.get(2)?,
        count: count.max(0) as u64,
        last_seen: millis_to_datetime(last_seen),
    })
}

/// SQLite implementation of UsageStore
pub struct SQLiteUsageStore {
    conn: Mutex<Connection>,
}

impl SQLiteUsageStore {
    /// Open the database at the configured path, creating the schema if needed
    pub fn open(config: &TelemetryConfig) -> Result<Self> {
        let db_path = Path::new(&config.db_path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        if config.wal_mode {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            info!("Usage database journal_mode = {}", mode);
        }
        conn.execute(SCHEMA, [])?;
        info!("Opened usage database at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VfsError::backend("usage database lock poisoned"))
    }
}

impl UsageStore for SQLiteUsageStore {
    fn record_hit(&self, hit: &UsageHit) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            UPSERT,
            params![hit.file, hit.site, hit.page, hit.at.timestamp_millis()],
        )?;
        Ok(())
    }

    fn top_files(&self, limit: usize) -> Result<Vec<FileTotal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file, SUM(count) AS total FROM file_usage
             GROUP BY file ORDER BY total DESC, file ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let total: i64 = row.get(1)?;
            Ok(FileTotal {
                file: row.get(0)?,
                total: total.max(0) as u64,
            })
        })?;

        let mut totals = Vec::new();
        for row in rows {
            totals.push(row?);
        }
        Ok(totals)
    }

    fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file, site, page, count, last_seen FROM file_usage
             ORDER BY last_seen DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn total_hits(&self) -> Result<u64> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM file_usage",
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    fn file_usage(&self, file: &str) -> Result<Vec<UsageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file, site, page, count, last_seen FROM file_usage
             WHERE file = ?1 ORDER BY count DESC, last_seen DESC",
        )?;
        let rows = stmt.query_map(params![file], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hit(file: &str, site: &str, page: &str, millis: i64) -> UsageHit {
        UsageHit {
            file: file.to_string(),
            site: site.to_string(),
            page: page.to_string(),
            at: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[test]
    fn test_upsert_increments_single_row() {
        let store = SQLiteUsageStore::in_memory().unwrap();

        store.record_hit(&hit("a.png", "example.com", "/home", 1_000)).unwrap();
        store.record_hit(&hit("a.png", "example.com", "/home", 2_000)).unwrap();

        let records = store.file_usage("a.png").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 2);
        assert_eq!(records[0].last_seen.timestamp_millis(), 2_000);
    }

    #[test]
    fn test_aggregate_reads() {
        let store = SQLiteUsageStore::in_memory().unwrap();

        store.record_hit(&hit("a.png", "example.com", "/home", 1_000)).unwrap();
        store.record_hit(&hit("a.png", "other.org", "/", 2_000)).unwrap();
        store.record_hit(&hit("b.css", "direct", "", 5_000)).unwrap();
        store.record_hit(&hit("a.png", "example.com", "/home", 3_000)).unwrap();

        assert_eq!(store.total_hits().unwrap(), 4);

        let top = store.top_files(10).unwrap();
        assert_eq!(top[0], FileTotal { file: "a.png".to_string(), total: 3 });
        assert_eq!(top[1], FileTotal { file: "b.css".to_string(), total: 1 });

        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].file, "b.css");
        assert_eq!(recent[1].site, "example.com");
        assert_eq!(recent[1].count, 2);
    }

    #[test]
    fn test_open_on_disk_with_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = TelemetryConfig {
            db_path: dir.path().join("nested").join("usage.db").display().to_string(),
            wal_mode: true,
            ..Default::default()
        };

        {
            let store = SQLiteUsageStore::open(&config).unwrap();
            store.record_hit(&hit("x", "direct", "", 10)).unwrap();
        }

        let reopened = SQLiteUsageStore::open(&config).unwrap();
        assert_eq!(reopened.total_hits().unwrap(), 1);
    }

    #[test]
    fn test_empty_store() {
        let store = SQLiteUsageStore::in_memory().unwrap();
        assert_eq!(store.total_hits().unwrap(), 0);
        assert!(store.top_files(5).unwrap().is_empty());
        assert!(store.recent(5).unwrap().is_empty());
    }
}

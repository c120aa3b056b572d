//! Local filesystem blob store
//!
//! Object keys are flat strings, so `docs` and `docs/a.txt` may both exist.
//! Bodies are therefore stored under the md5 of their key rather than under
//! the key itself, with a JSON sidecar holding the key and properties. An
//! in-memory ordered index of the sidecars serves listings.

use crate::error::{Result, VfsError};
use crate::storage::config::StorageConfig;
use crate::storage::{paginate, BlobBody, BlobObject, BlobStore, ListPage, ListRequest, ObjectInfo};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sidecar metadata persisted next to every body
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredObject {
    key: String,
    size: u64,
    content_type: Option<String>,
    etag: String,
    modified: DateTime<Utc>,
}

impl StoredObject {
    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            key: self.key.clone(),
            size: self.size,
            content_type: self.content_type.clone(),
            etag: Some(self.etag.clone()),
        }
    }
}

fn ensure_dir(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

fn object_stem(key: &str) -> String {
    format!("{:x}", md5::compute(key.as_bytes()))
}

/// Local filesystem blob store
pub struct LocalFsBlobStore {
    // key -> sidecar, ordered for prefix range scans
    index: RwLock<BTreeMap<String, StoredObject>>,
    objects_path: PathBuf,
    meta_path: PathBuf,
    temp_path: PathBuf,
}

impl LocalFsBlobStore {
    /// Open (or create) a store rooted at the configured paths
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let base_path = PathBuf::from(&config.base_path);
        let objects_path = base_path.join("bodies");
        let meta_path = base_path.join("meta");
        let temp_path = PathBuf::from(&config.temp_path);

        ensure_dir(&objects_path)?;
        ensure_dir(&meta_path)?;
        ensure_dir(&temp_path)?;

        let index = Self::load_index(&meta_path)?;
        info!(
            "Opened local blob store at {} with {} objects",
            base_path.display(),
            index.len()
        );

        Ok(Self {
            index: RwLock::new(index),
            objects_path,
            meta_path,
            temp_path,
        })
    }

    fn load_index(meta_path: &Path) -> Result<BTreeMap<String, StoredObject>> {
        let mut index = BTreeMap::new();
        for entry in fs::read_dir(meta_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stored = fs::read(&path)
                .map_err(VfsError::from)
                .and_then(|raw| serde_json::from_slice::<StoredObject>(&raw).map_err(VfsError::from));
            match stored {
                Ok(stored) => {
                    index.insert(stored.key.clone(), stored);
                }
                Err(e) => warn!("Skipping unreadable sidecar {}: {}", path.display(), e),
            }
        }
        Ok(index)
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.objects_path.join(object_stem(key))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.meta_path.join(format!("{}.json", object_stem(key)))
    }

    fn temp_file_path(&self, key: &str) -> PathBuf {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.temp_path
            .join(format!("{}.{}.{}.tmp", object_stem(key), std::process::id(), seq))
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredObject>>> {
        self.index
            .read()
            .map_err(|_| VfsError::backend("blob index lock poisoned"))
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredObject>>> {
        self.index
            .write()
            .map_err(|_| VfsError::backend("blob index lock poisoned"))
    }

    /// Stream `body` into a temp file, returning its size and md5
    fn spool(&self, temp: &Path, body: &mut dyn Read) -> io::Result<(u64, String)> {
        let mut file = File::create(temp)?;
        let mut digest = md5::Context::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            digest.consume(&buffer[..read]);
            file.write_all(&buffer[..read])?;
            size += read as u64;
        }
        file.flush()?;

        Ok((size, hex::encode(digest.compute().0)))
    }
}

impl BlobStore for LocalFsBlobStore {
    fn list(&self, request: &ListRequest) -> Result<ListPage> {
        let index = self.read_index()?;
        let entries = index
            .range(request.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(request.prefix.as_str()))
            .map(|(key, stored)| (key.as_str(), stored.size));
        Ok(paginate(entries, request))
    }

    fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        Ok(self.read_index()?.get(key).map(StoredObject::info))
    }

    fn get(&self, key: &str) -> Result<Option<BlobObject>> {
        let Some(info) = self.head(key)? else {
            return Ok(None);
        };

        match File::open(self.body_path(key)) {
            Ok(file) => {
                let body: BlobBody = Box::new(BufReader::new(file));
                Ok(Some(BlobObject { info, body }))
            }
            // Deleted between the index lookup and the open
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, body: &mut dyn Read, content_type: Option<&str>) -> Result<ObjectInfo> {
        let temp = self.temp_file_path(key);
        let (size, etag) = match self.spool(&temp, body) {
            Ok(spooled) => spooled,
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(e.into());
            }
        };

        let stored = StoredObject {
            key: key.to_string(),
            size,
            content_type: content_type.map(str::to_string),
            etag,
            modified: Utc::now(),
        };

        fs::rename(&temp, self.body_path(key))?;

        let sidecar_temp = self.temp_file_path(key);
        fs::write(&sidecar_temp, serde_json::to_vec(&stored)?)?;
        fs::rename(&sidecar_temp, self.sidecar_path(key))?;

        debug!("Stored object {} ({} bytes)", key, size);
        let info = stored.info();
        self.write_index()?.insert(key.to_string(), stored);
        Ok(info)
    }

    fn delete(&self, key: &str) -> Result<()> {
        for path in [self.sidecar_path(key), self.body_path(key)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.write_index()?.remove(key);
        debug!("Deleted object {}", key);
        Ok(())
    }
}

//! In-memory implementation of BlobStore for testing

use crate::error::{Result, VfsError};
use crate::storage::{paginate, BlobObject, BlobStore, ListPage, ListRequest, ObjectInfo};
use log::info;
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MockObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// In-memory BlobStore with optional failure injection
pub struct MockBlobStore {
    objects: Mutex<BTreeMap<String, MockObject>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failing_puts: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }

    /// Seed an object directly
    pub fn insert(&self, key: &str, data: &[u8]) {
        relock(&self.objects).insert(
            key.to_string(),
            MockObject {
                data: data.to_vec(),
                content_type: None,
            },
        );
    }

    /// Raw bytes of an object, if present
    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        relock(&self.objects).get(key).map(|o| o.data.clone())
    }

    /// All keys in ascending order
    pub fn keys(&self) -> Vec<String> {
        relock(&self.objects).keys().cloned().collect()
    }

    pub fn object_count(&self) -> usize {
        relock(&self.objects).len()
    }

    pub fn contains(&self, key: &str) -> bool {
        relock(&self.objects).contains_key(key)
    }

    /// Make every later `put` to `key` fail
    pub fn fail_puts_to(&self, key: &str) {
        relock(&self.failing_puts).insert(key.to_string());
    }

    /// Make every later `delete` of `key` fail
    pub fn fail_deletes_of(&self, key: &str) {
        relock(&self.failing_deletes).insert(key.to_string());
    }

    pub fn clear(&self) {
        relock(&self.objects).clear();
        relock(&self.failing_puts).clear();
        relock(&self.failing_deletes).clear();
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MockBlobStore {
    fn list(&self, request: &ListRequest) -> Result<ListPage> {
        let objects = relock(&self.objects);
        let entries = objects
            .range(request.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(request.prefix.as_str()))
            .map(|(key, object)| (key.as_str(), object.data.len() as u64));
        Ok(paginate(entries, request))
    }

    fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        Ok(relock(&self.objects).get(key).map(|object| ObjectInfo {
            key: key.to_string(),
            size: object.data.len() as u64,
            content_type: object.content_type.clone(),
            etag: Some(hex::encode(md5::compute(&object.data).0)),
        }))
    }

    fn get(&self, key: &str) -> Result<Option<BlobObject>> {
        let Some(info) = self.head(key)? else {
            return Ok(None);
        };
        let data = self.read(key).unwrap_or_default();
        Ok(Some(BlobObject {
            info,
            body: Box::new(Cursor::new(data)),
        }))
    }

    fn put(&self, key: &str, body: &mut dyn Read, content_type: Option<&str>) -> Result<ObjectInfo> {
        if relock(&self.failing_puts).contains(key) {
            return Err(VfsError::backend(format!("injected put failure for {}", key)));
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data)?;
        let info = ObjectInfo {
            key: key.to_string(),
            size: data.len() as u64,
            content_type: content_type.map(str::to_string),
            etag: Some(hex::encode(md5::compute(&data).0)),
        };

        info!("Mock: stored {} ({} bytes)", key, info.size);
        relock(&self.objects).insert(
            key.to_string(),
            MockObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(info)
    }

    fn delete(&self, key: &str) -> Result<()> {
        if relock(&self.failing_deletes).contains(key) {
            return Err(VfsError::backend(format!("injected delete failure for {}", key)));
        }
        relock(&self.objects).remove(key);
        info!("Mock: deleted {}", key);
        Ok(())
    }
}

//! File-manager operations over the blob store
//!
//! `FileService` is what the HTTP layer talks to. It composes keys for
//! uploads and placeholders, runs listings through the path policy, and
//! hands delete/move/rename to the transfer engine. All methods block on
//! the store and are called from `web::block`.

pub mod path_policy;
pub mod telemetry;
pub mod transfer;
pub mod walker;

use crate::error::{Result, VfsError};
use crate::service::path_policy::PathPolicy;
use crate::service::transfer::{TransferEngine, TransferReport};
use crate::service::walker::{DirectoryLevel, DirectoryTree, DirectoryWalker};
use crate::storage::{BlobObject, BlobStore, ObjectInfo};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::sync::Arc;

/// Zero-byte object that makes an empty directory visible
pub const PLACEHOLDER_NAME: &str = ".placeholder";

/// `2024` + `report.pdf` -> `2024/report.pdf`; no directory means the root
pub fn upload_key(directory: Option<&str>, name: &str) -> Result<String> {
    let name = name.trim_start_matches('/');
    if name.is_empty() {
        return Err(VfsError::validation("No file"));
    }

    let directory = directory
        .unwrap_or_default()
        .trim_start_matches('/')
        .trim_end_matches('/');
    if directory.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{}/{}", directory, name))
    }
}

pub fn placeholder_key(directory: &str) -> Result<String> {
    let directory = directory.trim_start_matches('/').trim_end_matches('/');
    if directory.is_empty() {
        return Err(VfsError::validation("No directory"));
    }
    Ok(format!("{}/{}", directory, PLACEHOLDER_NAME))
}

pub struct FileService {
    store: Arc<dyn BlobStore>,
    policy: Arc<PathPolicy>,
}

impl FileService {
    pub fn new(store: Arc<dyn BlobStore>, policy: Arc<PathPolicy>) -> Self {
        Self { store, policy }
    }

    pub fn list_level(&self, prefix: &str) -> Result<DirectoryLevel> {
        DirectoryWalker::new(self.store.as_ref(), &self.policy).list_level(prefix)
    }

    pub fn walk(&self, prefix: &str) -> Result<DirectoryTree> {
        DirectoryWalker::new(self.store.as_ref(), &self.policy).walk(prefix)
    }

    pub fn upload(
        &self,
        directory: Option<&str>,
        name: &str,
        body: &mut dyn Read,
        content_type: Option<&str>,
    ) -> Result<ObjectInfo> {
        let key = upload_key(directory, name)?;
        let info = self.store.put(&key, body, content_type)?;
        info!("Uploaded {} ({} bytes)", info.key, info.size);
        Ok(info)
    }

    /// Write `<directory>/.placeholder`, returning its key
    pub fn mkdir(&self, directory: &str) -> Result<String> {
        let key = placeholder_key(directory)?;
        self.store.put(&key, &mut Cursor::new(Vec::<u8>::new()), None)?;
        info!("Created directory placeholder {}", key);
        Ok(key)
    }

    pub fn delete(&self, key: &str, is_dir: bool) -> Result<TransferReport> {
        TransferEngine::new(self.store.as_ref()).delete(key, is_dir)
    }

    pub fn move_entry(&self, from: &str, to: &str, is_dir: bool) -> Result<TransferReport> {
        TransferEngine::new(self.store.as_ref()).move_entry(from, to, is_dir)
    }

    pub fn rename(&self, from: &str, to: &str, is_dir: bool) -> Result<TransferReport> {
        TransferEngine::new(self.store.as_ref()).rename(from, to, is_dir)
    }

    /// Open a key for public serving; blocked keys are never opened
    pub fn open_for_serve(&self, key: &str) -> Result<BlobObject> {
        if self.policy.is_blocked(key) {
            return Err(VfsError::Forbidden(key.to_string()));
        }
        debug!("Serving {}", key);
        self.store
            .get(key)?
            .ok_or_else(|| VfsError::not_found(format!("Not Found: {}", key)))
    }

    /// Read a document as text regardless of policy, `None` if absent
    pub fn read_document(&self, key: &str) -> Result<Option<String>> {
        match self.store.get(key)? {
            Some(object) => Ok(Some(object.text()?)),
            None => Ok(None),
        }
    }
}

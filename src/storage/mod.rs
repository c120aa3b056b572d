//! Blob Storage Layer Abstraction
//!
//! This module provides an abstraction over flat key/value object stores.
//! Keys are plain strings with no directory structure; everything
//! hierarchical is derived from prefix + delimiter listings.

pub mod config;
pub mod local_store;
pub mod mock_store;


use std::io::Read;

use crate::error::Result;

/// Default number of entries returned by one listing call
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Streaming object body
pub type BlobBody = Box<dyn Read + Send>;

/// Properties of a stored object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// An object opened for reading
pub struct BlobObject {
    pub info: ObjectInfo,
    pub body: BlobBody,
}

impl BlobObject {
    /// Consume the body as UTF-8 text
    pub fn text(mut self) -> Result<String> {
        let mut content = String::new();
        self.body.read_to_string(&mut content)?;
        Ok(content)
    }
}

/// One object entry in a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
}

/// Listing parameters
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub prefix: String,
    /// When set, keys with the delimiter after `prefix` are folded into common prefixes
    pub delimiter: Option<String>,
    /// Resume after this key or common prefix
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl ListRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: &str) -> Self {
        self.delimiter = Some(delimiter.to_string());
        self
    }

    pub fn after(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub common_prefixes: Vec<String>,
    /// Set when more entries remain; pass back as `ListRequest::cursor`
    pub next_cursor: Option<String>,
}

/// Trait defining the blob store interface
pub trait BlobStore: Send + Sync {
    /// List objects and common prefixes under a prefix
    fn list(&self, request: &ListRequest) -> Result<ListPage>;

    /// Object properties without opening the body
    fn head(&self, key: &str) -> Result<Option<ObjectInfo>>;

    /// Open an object for streaming, `None` if absent
    fn get(&self, key: &str) -> Result<Option<BlobObject>>;

    /// Store an object, replacing any existing one with the same key
    fn put(&self, key: &str, body: &mut dyn Read, content_type: Option<&str>) -> Result<ObjectInfo>;

    /// Remove an object; removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<()>;
}

/// Build one listing page from keys in ascending order.
///
/// Keys sharing a delimited segment are contiguous in sorted order, so each
/// common prefix is emitted once. The cursor is the last emitted entry; a
/// cursor that is a common prefix also skips every key below it.
///
/// Below the request prefix, a common prefix always contains the delimiter
/// and an object key listed with a delimiter never does, so the cursor's kind
/// follows from its remainder. An object key such as `docs/x/` listed under
/// `docs/x/` has an empty remainder and stays an object cursor.
pub fn paginate<'a, I>(entries: I, request: &ListRequest) -> ListPage
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let limit = request.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
    let skip_below = request.cursor.as_deref().filter(|cursor| {
        delimiter.map_or(false, |d| {
            cursor
                .strip_prefix(request.prefix.as_str())
                .map_or(false, |rest| rest.contains(d))
        })
    });

    let mut page = ListPage::default();
    let mut emitted = 0usize;
    let mut last_entry: Option<String> = None;

    for (key, size) in entries {
        let Some(rest) = key.strip_prefix(request.prefix.as_str()) else {
            continue;
        };

        if let Some(cursor) = request.cursor.as_deref() {
            if key <= cursor {
                continue;
            }
            if skip_below.map_or(false, |common| key.starts_with(common)) {
                continue;
            }
        }

        let grouped = delimiter.and_then(|d| {
            rest.find(d)
                .map(|pos| format!("{}{}", request.prefix, &rest[..pos + d.len()]))
        });

        if let Some(common) = &grouped {
            if page.common_prefixes.last() == Some(common) {
                continue;
            }
        }

        if emitted == limit {
            page.next_cursor = last_entry;
            break;
        }

        match grouped {
            Some(common) => {
                last_entry = Some(common.clone());
                page.common_prefixes.push(common);
            }
            None => {
                last_entry = Some(key.to_string());
                page.objects.push(ListedObject {
                    key: key.to_string(),
                    size,
                });
            }
        }
        emitted += 1;
    }

    page
}

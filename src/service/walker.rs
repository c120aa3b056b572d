//! Directory listing over the flat key space

use crate::error::Result;
use crate::service::path_policy::PathPolicy;
use crate::storage::{BlobStore, ListRequest, ListedObject};
use log::debug;
use serde::Serialize;
use std::collections::HashSet;

pub const DELIMITER: &str = "/";

/// Immediate children of one prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryLevel {
    pub files: Vec<String>,
    pub sub_prefixes: Vec<String>,
}

/// Everything transitively under one prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryTree {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

/// `docs` -> `docs/`; the root prefix stays empty
pub fn as_dir_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with(DELIMITER) {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, DELIMITER)
    }
}

pub struct DirectoryWalker<'a> {
    store: &'a dyn BlobStore,
    policy: Option<&'a PathPolicy>,
    /// Entries per store request; the store default when unset
    page_size: Option<usize>,
}

impl<'a> DirectoryWalker<'a> {
    /// Walker that hides whatever `policy` blocks
    pub fn new(store: &'a dyn BlobStore, policy: &'a PathPolicy) -> Self {
        Self {
            store,
            policy: Some(policy),
            page_size: None,
        }
    }

    /// Walker that reports every stored key, placeholders included
    pub fn unfiltered(store: &'a dyn BlobStore) -> Self {
        Self {
            store,
            policy: None,
            page_size: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    fn keeps_file(&self, object: &ListedObject) -> bool {
        match self.policy {
            Some(policy) => {
                !policy.is_blocked(&object.key) && !(policy.hides_empty_objects() && object.size == 0)
            }
            None => true,
        }
    }

    fn keeps_prefix(&self, prefix: &str) -> bool {
        self.policy.map_or(true, |policy| !policy.is_blocked(prefix))
    }

    /// Immediate files and sub-prefixes of `prefix`
    pub fn list_level(&self, prefix: &str) -> Result<DirectoryLevel> {
        let prefix = as_dir_prefix(prefix);
        let mut level = DirectoryLevel::default();
        let mut cursor = None;

        loop {
            let mut request = ListRequest::new(prefix.clone())
                .with_delimiter(DELIMITER)
                .after(cursor);
            if let Some(page_size) = self.page_size {
                request = request.with_limit(page_size);
            }
            let page = self.store.list(&request)?;

            level.files.extend(
                page.objects
                    .into_iter()
                    .filter(|object| self.keeps_file(object))
                    .map(|object| object.key),
            );
            level.sub_prefixes.extend(
                page.common_prefixes
                    .into_iter()
                    .filter(|sub| self.keeps_prefix(sub)),
            );

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(
            "Listed {:?}: {} files, {} sub-prefixes",
            prefix,
            level.files.len(),
            level.sub_prefixes.len()
        );
        Ok(level)
    }

    /// Depth-first walk collecting every file and sub-prefix under `prefix`
    pub fn walk(&self, prefix: &str) -> Result<DirectoryTree> {
        let mut tree = DirectoryTree::default();
        let mut seen_files = HashSet::new();
        let mut seen_dirs = HashSet::new();
        self.walk_into(&as_dir_prefix(prefix), &mut tree, &mut seen_files, &mut seen_dirs)?;
        Ok(tree)
    }

    fn walk_into(
        &self,
        prefix: &str,
        tree: &mut DirectoryTree,
        seen_files: &mut HashSet<String>,
        seen_dirs: &mut HashSet<String>,
    ) -> Result<()> {
        let level = self.list_level(prefix)?;

        for file in level.files {
            if seen_files.insert(file.clone()) {
                tree.files.push(file);
            }
        }

        // each sub-prefix is strictly longer than `prefix`, so this descends
        for sub in level.sub_prefixes {
            if !seen_dirs.insert(sub.clone()) {
                continue;
            }
            tree.directories.push(sub.clone());
            self.walk_into(&sub, tree, seen_files, seen_dirs)?;
        }

        Ok(())
    }
}

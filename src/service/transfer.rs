//! Delete, move and rename over a flat store
//!
//! The store has no rename and no transactions, so a directory-level
//! operation is planned up front as a list of per-object steps and then
//! applied one step at a time. A move step always writes the target before
//! deleting the source; if the delete fails the object exists twice, never
//! zero times. Every step outcome lands in the [`TransferReport`].
//!
//! Moving a directory into one of its ancestors can map a step's target onto
//! another step's source (`a/b/b/x -> a/b/x` while `a/b/x -> a/x`). Such a
//! plan is ordered so every source is moved away before anything writes over
//! it, and a step never overwrites a source whose own copy did not land.

use crate::error::{Result, VfsError};
use crate::service::walker::{as_dir_prefix, DirectoryWalker};
use crate::storage::BlobStore;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;

/// Strip trailing `/` so `docs/` and `docs` name the same entry
pub fn normalize_key(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Delete,
    Move,
    Rename,
}

/// One object-level action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferStep {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferPlan {
    pub kind: TransferKind,
    pub is_dir: bool,
    /// Normalized source key
    pub from: String,
    /// Normalized target key, absent for deletes
    pub to: Option<String>,
    pub steps: Vec<TransferStep>,
}

/// Where a step stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStage {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub stage: TransferStage,
    pub error: String,
}

/// Per-step outcome of an applied plan
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub kind: TransferKind,
    pub is_dir: bool,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Sources fully handled
    pub applied: Vec<String>,
    /// Sources that vanished between planning and applying
    pub missing: Vec<String>,
    pub failed: Vec<StepFailure>,
}

impl TransferReport {
    fn for_plan(plan: &TransferPlan) -> Self {
        Self {
            kind: plan.kind,
            is_dir: plan.is_dir,
            from: plan.from.clone(),
            to: plan.to.clone(),
            applied: Vec::new(),
            missing: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// When some target is also a source, move shorter keys first.
///
/// Targets only collide with sources when the destination is an ancestor of
/// the source directory, and then every target is shorter than its source.
/// A step whose source is another step's target therefore has the shorter
/// source and runs first.
fn order_overlapping_steps(steps: &mut [TransferStep]) {
    let sources: HashSet<&str> = steps.iter().map(|s| s.source.as_str()).collect();
    let overlapping = steps
        .iter()
        .filter_map(|s| s.target.as_deref())
        .any(|target| sources.contains(target));
    if overlapping {
        debug!("Targets overlap sources; ordering {} steps shallowest first", steps.len());
        steps.sort_by_key(|s| s.source.len());
    }
}

pub struct TransferEngine<'a> {
    store: &'a dyn BlobStore,
}

impl<'a> TransferEngine<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self { store }
    }

    /// Every key under `prefix`, placeholders and policy-hidden keys included
    fn keys_under(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(DirectoryWalker::unfiltered(self.store)
            .walk(&as_dir_prefix(prefix))?
            .files)
    }

    pub fn plan_delete(&self, key: &str, is_dir: bool) -> Result<TransferPlan> {
        let from = normalize_key(key);
        if from.is_empty() {
            return Err(VfsError::validation("No key"));
        }

        let steps = if is_dir {
            self.keys_under(&from)?
                .into_iter()
                .map(|source| TransferStep { source, target: None })
                .collect()
        } else {
            vec![TransferStep {
                source: from.clone(),
                target: None,
            }]
        };

        Ok(TransferPlan {
            kind: TransferKind::Delete,
            is_dir,
            from,
            to: None,
            steps,
        })
    }

    /// Plan a move or rename. Rejects a target equal to or nested under the
    /// source before touching the store.
    pub fn plan_move(&self, kind: TransferKind, from: &str, to: &str, is_dir: bool) -> Result<TransferPlan> {
        let from = normalize_key(from);
        let to = normalize_key(to);
        if from.is_empty() || to.is_empty() {
            return Err(VfsError::validation("Missing from/to"));
        }
        if from == to {
            return Err(VfsError::validation("Cannot move folder into itself"));
        }

        let steps = if is_dir {
            let from_prefix = as_dir_prefix(&from);
            let to_prefix = as_dir_prefix(&to);
            if to_prefix.starts_with(&from_prefix) {
                return Err(VfsError::validation(
                    "Cannot move a folder into itself or its subdirectory",
                ));
            }

            let mut steps: Vec<TransferStep> = self
                .keys_under(&from_prefix)?
                .into_iter()
                .map(|source| {
                    let target = format!("{}{}", to_prefix, &source[from_prefix.len()..]);
                    TransferStep {
                        source,
                        target: Some(target),
                    }
                })
                .collect();
            order_overlapping_steps(&mut steps);
            steps
        } else {
            if self.store.head(&from)?.is_none() {
                return Err(VfsError::not_found("File not found"));
            }
            vec![TransferStep {
                source: from.clone(),
                target: Some(to.clone()),
            }]
        };

        Ok(TransferPlan {
            kind,
            is_dir,
            from,
            to: Some(to),
            steps,
        })
    }

    /// Run every step of `plan`. Never stops early; failures are collected.
    pub fn apply(&self, plan: &TransferPlan) -> TransferReport {
        let mut report = TransferReport::for_plan(plan);
        let sources: HashSet<&str> = plan.steps.iter().map(|s| s.source.as_str()).collect();

        for step in &plan.steps {
            match &step.target {
                Some(target) => {
                    // a source whose copy failed still holds the only copy of its bytes
                    let target_unmoved = sources.contains(target.as_str())
                        && report.failed.iter().any(|f| {
                            f.key == *target && matches!(f.stage, TransferStage::Read | TransferStage::Write)
                        });
                    if target_unmoved {
                        warn!("Not overwriting {} (from {}): it was not moved", target, step.source);
                        report.failed.push(StepFailure {
                            key: step.source.clone(),
                            target: Some(target.clone()),
                            stage: TransferStage::Write,
                            error: format!("Target {} still holds an object that was not moved", target),
                        });
                        continue;
                    }
                    self.apply_copy_then_delete(&step.source, target, &mut report)
                }
                None => self.apply_delete(&step.source, &mut report),
            }
        }

        if report.is_complete() {
            info!(
                "{:?} {} -> {:?}: {} applied, {} missing",
                plan.kind,
                plan.from,
                plan.to,
                report.applied.len(),
                report.missing.len()
            );
        } else {
            warn!(
                "{:?} {} -> {:?}: {} applied, {} missing, {} failed",
                plan.kind,
                plan.from,
                plan.to,
                report.applied.len(),
                report.missing.len(),
                report.failed.len()
            );
        }
        report
    }

    fn apply_delete(&self, source: &str, report: &mut TransferReport) {
        match self.store.delete(source) {
            Ok(()) => report.applied.push(source.to_string()),
            Err(e) => {
                warn!("Failed to delete {}: {}", source, e);
                report.failed.push(StepFailure {
                    key: source.to_string(),
                    target: None,
                    stage: TransferStage::Delete,
                    error: e.to_string(),
                });
            }
        }
    }

    fn apply_copy_then_delete(&self, source: &str, target: &str, report: &mut TransferReport) {
        let fail = |stage: TransferStage, error: VfsError| StepFailure {
            key: source.to_string(),
            target: Some(target.to_string()),
            stage,
            error: error.to_string(),
        };

        let object = match self.store.get(source) {
            Ok(Some(object)) => object,
            Ok(None) => {
                report.missing.push(source.to_string());
                return;
            }
            Err(e) => {
                warn!("Failed to read {}: {}", source, e);
                report.failed.push(fail(TransferStage::Read, e));
                return;
            }
        };

        let content_type = object.info.content_type.clone();
        let mut body = object.body;
        if let Err(e) = self.store.put(target, &mut body, content_type.as_deref()) {
            warn!("Failed to write {} (from {}): {}", target, source, e);
            report.failed.push(fail(TransferStage::Write, e));
            return;
        }

        // target is durable; a failed delete leaves a duplicate
        if let Err(e) = self.store.delete(source) {
            warn!("Copied {} to {} but failed to delete source: {}", source, target, e);
            report.failed.push(fail(TransferStage::Delete, e));
            return;
        }

        report.applied.push(source.to_string());
    }

    pub fn delete(&self, key: &str, is_dir: bool) -> Result<TransferReport> {
        let plan = self.plan_delete(key, is_dir)?;
        Ok(self.apply(&plan))
    }

    pub fn move_entry(&self, from: &str, to: &str, is_dir: bool) -> Result<TransferReport> {
        self.transfer(TransferKind::Move, from, to, is_dir)
    }

    /// Rename is a move whose target differs only in the final segment;
    /// it goes through the same guards and steps.
    pub fn rename(&self, from: &str, to: &str, is_dir: bool) -> Result<TransferReport> {
        self.transfer(TransferKind::Rename, from, to, is_dir)
    }

    fn transfer(&self, kind: TransferKind, from: &str, to: &str, is_dir: bool) -> Result<TransferReport> {
        let plan = self.plan_move(kind, from, to, is_dir)?;
        let report = self.apply(&plan);

        // a lone file that vanished after planning is still a not-found
        if !plan.is_dir && !report.missing.is_empty() {
            return Err(VfsError::not_found("File not found"));
        }
        Ok(report)
    }
}

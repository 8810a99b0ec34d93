use super::error::DgResult;
use super::types::{CelldiskType, DiskgroupRecord, SizeSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{error, info, warn};

/// A compensating action and the arguments it was bound to when pushed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RollbackAction {
    /// Resize the ASM diskgroup back to `size_mb`.
    ResizeDiskgroup { name: String, size_mb: u64 },
    /// Resize the grid disks of `name` back to the slice of `size_mb`.
    ResizeGridDisks { name: String, size_mb: u64 },
    DropGridDisks { prefix: String, force: bool },
    DropDiskgroup { name: String, force: bool },
    CreateSparseGridDisks { prefix: String, celldisk_type: CelldiskType, slice_mb: u64 },
    /// Recreate a dropped sparse diskgroup and restore its store record.
    CreateSparseDiskgroup { record: DiskgroupRecord },
    EnsureRebalanced { names: Vec<String> },
    /// Check live sizes against the sizes recorded before the operation.
    ValidateSizes { expected: BTreeMap<String, SizeSnapshot> },
    RelocateVoteDisks,
}

impl RollbackAction {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ResizeDiskgroup { .. } => "resize diskgroup",
            Self::ResizeGridDisks { .. } => "resize grid disks",
            Self::DropGridDisks { .. } => "drop grid disks",
            Self::DropDiskgroup { .. } => "drop diskgroup",
            Self::CreateSparseGridDisks { .. } => "create sparse grid disks",
            Self::CreateSparseDiskgroup { .. } => "create sparse diskgroup",
            Self::EnsureRebalanced { .. } => "ensure rebalanced",
            Self::ValidateSizes { .. } => "validate sizes",
            Self::RelocateVoteDisks => "relocate vote disks",
        }
    }
}

/// Something that knows how to carry out a [`RollbackAction`].
pub trait RollbackExecutor: Sync {
    fn apply(&self, action: &RollbackAction) -> impl Future<Output = DgResult<()>> + Send;
}

/// Compensating actions of one operation, unwound newest first.
#[derive(Debug, Default)]
pub struct RollbackStack {
    entries: Vec<RollbackAction>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: RollbackAction) {
        info!("Rollback registered: {}", action.label());
        self.entries.push(action);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unwind every entry, LIFO.
    ///
    /// The first entry popped may fail without stopping the unwind; any later
    /// failure stops it and is returned. The stack is empty afterwards either way.
    pub async fn run_all(&mut self, exec: &impl RollbackExecutor) -> DgResult<()> {
        let mut first = true;
        while let Some(action) = self.entries.pop() {
            info!("Rolling back: {}", action.label());
            if let Err(e) = exec.apply(&action).await {
                if first {
                    warn!("Rollback of {} failed, continuing: {}", action.label(), e);
                } else {
                    error!("Rollback of {} failed, abandoning {} remaining: {}", action.label(), self.entries.len(), e);
                    self.entries.clear();
                    return Err(e);
                }
            }
            first = false;
        }
        Ok(())
    }
}

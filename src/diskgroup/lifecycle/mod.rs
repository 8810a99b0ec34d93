mod create;
mod drop;
mod resize;

use super::error::{DgResult, DiskgroupError, ErrorKind, KindExt};
use super::gateway::{AsmAgent, AsmGateway};
use super::griddisk::{derive_topology, GridDiskExecutor};
use super::input::{parse_input, DiskgroupOp, OperationInput};
use super::monitor::{RebalanceMonitor, RebalanceProgressState};
use super::reporter::ProgressReporter;
use super::rollback::{RollbackAction, RollbackExecutor, RollbackStack};
use super::types::{CellGridDiskTopology, DiskgroupRecord, OperationConfig, Tier};
use super::validator::Validator;
use crate::db::Database;
use crate::executor::RemoteShell;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Key of the precheck verdict in an operation's result data.
pub const PRECHECK_VERDICT_KEY: &str = "validatePrecheckSparseCreation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultStatus {
    Pass,
    Fail,
}

/// What a caller gets back from one lifecycle operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    #[serde(rename = "Status")]
    pub status: ResultStatus,
    #[serde(rename = "ErrorCode")]
    pub error_code: u32,
    #[serde(rename = "Log")]
    pub log: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OperationResult {
    fn pass(log: String, data: Option<Value>) -> Self {
        Self { status: ResultStatus::Pass, error_code: 0, log, data }
    }

    fn fail(err: &DiskgroupError, data: Option<Value>) -> Self {
        Self { status: ResultStatus::Fail, error_code: err.code(), log: err.log_line(), data }
    }

    pub fn passed(&self) -> bool {
        self.status == ResultStatus::Pass
    }
}

/// Mutable state of one running operation.
#[derive(Debug, Default)]
pub(super) struct OperationContext {
    rollback: RollbackStack,
    progress: RebalanceProgressState,
    data: Option<Value>,
}

/// Post-rebalance check: the live size is within 1 GB of the requested one.
pub fn is_resized(set_mb: u64, requested_mb: u64) -> bool {
    let diff = (set_mb as f64 / 1024.0 - requested_mb as f64 / 1024.0).trunc();
    (-1.0..=1.0).contains(&diff)
}

fn tier_record(records: &[DiskgroupRecord], tier: Tier) -> DgResult<&DiskgroupRecord> {
    records.iter().find(|r| r.tier == tier).ok_or_else(|| {
        DiskgroupError::new(ErrorKind::DgDoesNotExist, format!("no {tier} diskgroup is configured"))
    })
}

/// Runs diskgroup lifecycle operations against one cluster.
pub struct DiskgroupManager<'a, S, A> {
    shell: &'a S,
    gateway: AsmGateway<'a, A>,
    griddisks: GridDiskExecutor<'a, S>,
    store: &'a Database,
    cfg: &'a OperationConfig,
    /// First ASM node, for the detailed rebalance queries.
    asm_node: Option<&'a str>,
    reporter: &'a dyn ProgressReporter,
    cancel: CancellationToken,
}

impl<'a, S: RemoteShell, A: AsmAgent> DiskgroupManager<'a, S, A> {
    pub fn new(
        shell: &'a S,
        agent: &'a A,
        cells: &[String],
        store: &'a Database,
        cfg: &'a OperationConfig,
    ) -> Self {
        Self {
            shell,
            gateway: AsmGateway::new(agent, cfg),
            griddisks: GridDiskExecutor::new(shell, cells, cfg.sparse_vsize_factor),
            store,
            cfg,
            asm_node: None,
            reporter: &(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_asm_node(mut self, node: Option<&'a str>) -> Self {
        self.asm_node = node;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one operation by command name; failures are rolled back and reported, never raised.
    pub async fn run(&self, command: &str, payload: Option<&Value>) -> OperationResult {
        let mut ctx = OperationContext::default();
        match self.dispatch(command, payload, &mut ctx).await {
            Ok(log) => {
                info!("{} passed: {}", command, log);
                OperationResult::pass(log, ctx.data)
            }
            Err(err) => {
                error!("{} failed: {}", command, err);
                if !ctx.rollback.is_empty() {
                    warn!("Rolling back {} step(s) of {}", ctx.rollback.len(), command);
                    if let Err(e) = ctx.rollback.run_all(self).await {
                        error!("Rollback of {} did not complete: {}", command, e);
                    }
                }
                OperationResult::fail(&err, ctx.data)
            }
        }
    }

    async fn dispatch(
        &self,
        command: &str,
        payload: Option<&Value>,
        ctx: &mut OperationContext,
    ) -> DgResult<String> {
        let op = DiskgroupOp::parse(command)?;
        let records = self.records()?;
        let input = parse_input(op, payload, &records)?;
        info!("Running {} for diskgroup {}", op.command(), input.diskgroup);

        match op {
            DiskgroupOp::Create | DiskgroupOp::UpdateAddSparse => {
                self.create(op, &input, &records, ctx).await
            }
            DiskgroupOp::Precheck => {
                let outcome = self.create(op, &input, &records, ctx).await;
                let verdict = if outcome.is_ok() { "Success" } else { "Failed" };
                ctx.data = Some(json!({ PRECHECK_VERDICT_KEY: verdict }));
                outcome
            }
            DiskgroupOp::Resize => self.resize(&input, ctx).await,
            DiskgroupOp::Rebalance => self.rebalance(&input, &records).await,
            DiskgroupOp::Info => self.info(&input, ctx).await,
            DiskgroupOp::Drop => self.drop_sparse(&input, &records, ctx).await,
        }
    }

    fn records(&self) -> DgResult<Vec<DiskgroupRecord>> {
        self.store.list_diskgroups().kind(ErrorKind::ErrorFetchingDetails)
    }

    fn step(&self, current: &str, steps: &[&str], message: &str) {
        info!("Step {}: {}", current, message);
        self.reporter.step(current, steps, message);
    }

    fn validator(&self) -> Validator<'_, S, A> {
        Validator::new(&self.gateway, &self.griddisks, self.cfg)
    }

    fn monitor(&self) -> RebalanceMonitor<'_, S, A> {
        RebalanceMonitor::new(self.shell, &self.gateway, self.asm_node, self.cfg, self.reporter, &self.cancel)
    }

    async fn topology(&self, diskgroup: &str) -> DgResult<CellGridDiskTopology> {
        let failgroups = self.gateway.failgroups(diskgroup).await?;
        derive_topology(diskgroup, &failgroups)
    }

    /// Configured size of every tier, the weights of the overall rebalance progress.
    fn progress_weights(&self) -> Vec<(String, u64)> {
        match self.store.list_diskgroups() {
            Ok(records) => records.into_iter().map(|r| (r.name, r.size_gb)).collect(),
            Err(e) => {
                warn!("Could not read diskgroup sizes for progress weights: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn wait_rebalanced(&self, diskgroup: &str, progress: &mut RebalanceProgressState) -> DgResult<()> {
        let weights = self.progress_weights();
        self.monitor().wait_until_rebalanced(diskgroup, progress, &weights).await
    }

    /// Record a diskgroup's new size and slice in the store.
    fn store_size(&self, diskgroup: &str, slice_mb: u64, size_mb: u64) -> DgResult<()> {
        let Some(mut record) = self.store.diskgroup_by_name(diskgroup).kind(ErrorKind::UpdateError)? else {
            warn!("Diskgroup {} has no store record, size not recorded", diskgroup);
            return Ok(());
        };
        record.slice_size_gb = slice_mb / 1024;
        record.size_gb = size_mb / 1024;
        if Tier::from_name(diskgroup) == Some(Tier::Sparse) {
            record.sparse_virtual_size_gb = record.slice_size_gb * self.cfg.sparse_vsize_factor;
        }
        self.store.upsert_diskgroup(&record).kind(ErrorKind::UpdateError)?;
        info!("Stored {}: {} GB, slice {} GB", diskgroup, record.size_gb, record.slice_size_gb);
        Ok(())
    }

    /// ASM-level resize to `new_mb` with no fail-group list, then record it.
    async fn resize_dg(&self, diskgroup: &str, new_mb: u64, power: Option<u32>) -> DgResult<()> {
        let topology = self.topology(diskgroup).await?;
        let slice = topology.slice_mb(new_mb);
        let asm_size = if topology_is_sparse(&topology) { self.cfg.to_virtual(slice) } else { slice };
        info!("Resizing diskgroup {} to {} MB, slice {} MB", diskgroup, new_mb, slice);
        self.gateway.resize(diskgroup, asm_size, &[], power).await.map_err(|e| {
            DiskgroupError::new(
                ErrorKind::NonModifiable,
                format!("diskgroup {diskgroup} could not be resized to {slice} M: {}", e.detail),
            )
        })?;
        self.store_size(diskgroup, slice, new_mb)
    }

    async fn resize_griddisks(&self, diskgroup: &str, new_mb: u64) -> DgResult<u64> {
        let topology = self.topology(diskgroup).await?;
        let sparse = topology_is_sparse(&topology);
        self.griddisks.resize_griddisks(&topology, new_mb, sparse).await
    }

    /// Resize a tier and its grid disks, logical first when shrinking and physical first when growing.
    async fn resize_dg_and_griddisks(
        &self,
        ctx: &mut OperationContext,
        diskgroup: &str,
        current_mb: u64,
        new_mb: u64,
        power: Option<u32>,
    ) -> DgResult<()> {
        let name = diskgroup.to_string();
        if current_mb > new_mb {
            ctx.rollback.push(RollbackAction::ResizeDiskgroup { name: name.clone(), size_mb: current_mb });
            self.resize_dg(diskgroup, new_mb, power).await?;
            ctx.rollback.push(RollbackAction::ResizeGridDisks { name, size_mb: current_mb });
            self.resize_griddisks(diskgroup, new_mb).await?;
        } else if current_mb < new_mb {
            ctx.rollback.push(RollbackAction::ResizeGridDisks { name: name.clone(), size_mb: current_mb });
            self.resize_griddisks(diskgroup, new_mb).await?;
            ctx.rollback.push(RollbackAction::ResizeDiskgroup { name, size_mb: current_mb });
            self.resize_dg(diskgroup, new_mb, power).await?;
        } else {
            info!("{} is already {} MB, skipping diskgroup and grid disk resize", diskgroup, new_mb);
        }
        Ok(())
    }

    /// Compare the live size of a diskgroup against what was requested.
    async fn validate_size(&self, diskgroup: &str, requested_mb: u64) -> DgResult<()> {
        let set_mb = self.gateway.storage(diskgroup).await?.total_mb;
        if is_resized(set_mb, requested_mb) {
            info!("{} has been resized to {} MB", diskgroup, set_mb);
            Ok(())
        } else {
            Err(DiskgroupError::new(
                ErrorKind::InvalidPropValue,
                format!("invalid size of diskgroup {diskgroup}: {set_mb} MB, expected {requested_mb} MB"),
            ))
        }
    }

    async fn info(&self, input: &OperationInput, ctx: &mut OperationContext) -> DgResult<String> {
        const STEPS: [&str; 2] = ["InfoFetch", "Complete"];
        self.step(STEPS[0], &STEPS, &format!("Fetching info of diskgroup {}", input.diskgroup));
        let props = self.gateway.info(&input.diskgroup, &input.info_props()).await?;
        ctx.data = Some(props);
        self.step(STEPS[1], &STEPS, "Diskgroup info fetched");
        Ok(format!("Fetched info of diskgroup {}", input.diskgroup))
    }
}

fn topology_is_sparse(topology: &CellGridDiskTopology) -> bool {
    Tier::from_name(&topology.diskgroup) == Some(Tier::Sparse)
}

impl<S: RemoteShell, A: AsmAgent> RollbackExecutor for DiskgroupManager<'_, S, A> {
    async fn apply(&self, action: &RollbackAction) -> DgResult<()> {
        match action {
            RollbackAction::ResizeDiskgroup { name, size_mb } => self.resize_dg(name, *size_mb, None).await,
            RollbackAction::ResizeGridDisks { name, size_mb } => {
                self.resize_griddisks(name, *size_mb).await.map(|_| ())
            }
            RollbackAction::DropGridDisks { prefix, force } => self.griddisks.drop_griddisks(prefix, *force).await,
            RollbackAction::DropDiskgroup { name, force } => {
                self.gateway.drop_diskgroup(name, *force).await.map_err(|e| {
                    DiskgroupError::new(ErrorKind::DgOperationError, format!("drop of {name} failed: {}", e.detail))
                })?;
                self.store.remove_diskgroup(name).kind(ErrorKind::UpdateError)?;
                Ok(())
            }
            RollbackAction::CreateSparseGridDisks { prefix, celldisk_type, slice_mb } => {
                self.griddisks.create_sparse_griddisks(prefix, *celldisk_type, *slice_mb).await
            }
            RollbackAction::CreateSparseDiskgroup { record } => {
                self.gateway.create(&record.name, Tier::Sparse).await.map_err(|e| {
                    DiskgroupError::new(
                        ErrorKind::DgOperationError,
                        format!("create of {} failed: {}", record.name, e.detail),
                    )
                })?;
                self.store.upsert_diskgroup(record).kind(ErrorKind::UpdateError)
            }
            RollbackAction::EnsureRebalanced { names } => {
                let mut progress = RebalanceProgressState::new();
                for name in names {
                    self.wait_rebalanced(name, &mut progress).await?;
                }
                Ok(())
            }
            RollbackAction::ValidateSizes { expected } => {
                for (name, snapshot) in expected {
                    self.validate_size(name, snapshot.total_mb).await?;
                }
                Ok(())
            }
            RollbackAction::RelocateVoteDisks => self.gateway.relocate_vote_disks().await.map(|_| ()),
        }
    }
}

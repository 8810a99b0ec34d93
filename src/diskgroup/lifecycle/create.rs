use super::{tier_record, DiskgroupManager, OperationContext};
use crate::diskgroup::error::{DgResult, DiskgroupError, ErrorKind, KindExt};
use crate::diskgroup::gateway::AsmAgent;
use crate::diskgroup::input::{DiskgroupOp, OperationInput};
use crate::diskgroup::planner::{plan_sizes, PlanInput};
use crate::diskgroup::rollback::RollbackAction;
use crate::diskgroup::types::{sparse_name_for, DiskgroupRecord, Tier};
use crate::executor::RemoteShell;
use tracing::info;

const STEPS: [&str; 6] = [
    "Check_Diskgroups_Resizable",
    "Update_DiskgroupData",
    "Resize_Diskgroup_and_Cell_Griddisks",
    "Create_Griddisks",
    "Create_Diskgroup",
    "Complete",
];

impl<S: RemoteShell, A: AsmAgent> DiskgroupManager<'_, S, A> {
    /// Create the sparse tier, carving its space out of DATA and RECO when shrinking.
    ///
    /// A precheck stops after the resizability check.
    pub(super) async fn create(
        &self,
        op: DiskgroupOp,
        input: &OperationInput,
        records: &[DiskgroupRecord],
        ctx: &mut OperationContext,
    ) -> DgResult<String> {
        let tier = input
            .tier
            .ok_or_else(|| DiskgroupError::new(ErrorKind::MissingDiskgroupType, op.command()))?;
        let data = tier_record(records, Tier::Data)?;
        let reco = tier_record(records, Tier::Reco)?;
        let shrink = match op {
            DiskgroupOp::UpdateAddSparse => input.shrink.unwrap_or(false),
            _ => input.shrink.unwrap_or(true),
        };

        let name = if tier == Tier::Sparse { sparse_name_for(&data.name) } else { input.diskgroup.clone() };
        if self.gateway.exists(&name).await {
            return Err(DiskgroupError::new(ErrorKind::DgAlreadyExists, format!("the diskgroup {name} already exists")));
        }
        if shrink && records.iter().any(|r| r.tier == tier) {
            return Err(DiskgroupError::new(
                ErrorKind::DgAlreadyExists,
                format!("a {tier} diskgroup is already configured"),
            ));
        }
        if tier != Tier::Sparse {
            return Err(DiskgroupError::new(
                ErrorKind::UnsupportedOption,
                format!("diskgroup type {tier} is not supported by {}", op.command()),
            ));
        }

        self.step(STEPS[0], &STEPS, "Checking diskgroup current and new sizes");
        info!("Creating diskgroup {} of type {}", name, tier);
        let data_cur = self.gateway.storage(&data.name).await?.total_mb;
        let reco_cur = self.gateway.storage(&reco.name).await?.total_mb;
        let plan = plan_sizes(&PlanInput {
            data_mb: data_cur,
            reco_mb: reco_cur,
            sparse_mb: None,
            redundancy: data.redundancy,
            ratio: input.storage_distribution.clone(),
            total_storage_gb: input.total_storage_gb,
            disk_backup_enabled: input.disk_backup_enabled,
            sparse_create: true,
            shrink_existing: shrink,
        })?;

        let validator = self.validator();
        validator.check_resizable(&data.name, plan.aligned_data_mb(), None).await?;
        validator.check_resizable(&reco.name, plan.aligned_reco_mb(), None).await?;
        if op == DiskgroupOp::Precheck {
            return Ok(format!("Sparse diskgroup {name} can be created"));
        }

        self.step(STEPS[1], &STEPS, "Getting cell count and griddisk count");
        let topology = self.topology(&data.name).await?;
        let plan = plan.with_sparse_slice(topology.cell_count(), topology.griddisks_per_cell);
        let slice_mb = plan.sparse_slice_mb.unwrap_or(0);
        if slice_mb < 1024 {
            return Err(DiskgroupError::new(
                ErrorKind::InvalidArgs,
                format!("sparse size of {} MB leaves no usable grid disk slice", plan.aligned_sparse_mb()),
            ));
        }

        if shrink {
            self.step(STEPS[2], &STEPS, "Attempting to resize DGs and Griddisks");
            self.resize_dg_and_griddisks(ctx, &data.name, data_cur, plan.aligned_data_mb(), input.rebalance_power)
                .await?;
            self.resize_dg_and_griddisks(ctx, &reco.name, reco_cur, plan.aligned_reco_mb(), input.rebalance_power)
                .await?;
        } else {
            self.step(STEPS[2], &STEPS, "Shrink is set to false. Skipping dg and griddisk resize");
        }

        self.step(STEPS[3], &STEPS, "Creating sparse griddisks");
        ctx.rollback.push(RollbackAction::DropGridDisks { prefix: name.clone(), force: false });
        self.griddisks.create_sparse_griddisks(&name, topology.celldisk_type, slice_mb).await?;

        self.step(STEPS[4], &STEPS, "Creating sparse diskgroup");
        ctx.rollback.push(RollbackAction::DropDiskgroup { name: name.clone(), force: true });
        self.gateway.create(&name, Tier::Sparse).await.map_err(|e| {
            DiskgroupError::new(ErrorKind::DgOperationError, format!("create of {name} failed: {}", e.detail))
        })?;

        let mut record = DiskgroupRecord::sparse_from_data(data);
        let parts = (topology.cell_count() * topology.griddisks_per_cell).max(1) as u64;
        record.size_gb = plan.aligned_sparse_mb() / 1024;
        record.slice_size_gb = record.size_gb / parts;
        record.sparse_virtual_size_gb = record.slice_size_gb * self.cfg.sparse_vsize_factor;
        record.ocr_vote = false;
        record.quorum = self.cfg.enable_quorum;
        self.store.upsert_diskgroup(&record).kind(ErrorKind::UpdateError)?;
        info!(
            "Recorded sparse diskgroup {}: {} GB, slice {} GB, virtual {} GB",
            record.name, record.size_gb, record.slice_size_gb, record.sparse_virtual_size_gb
        );

        self.wait_rebalanced(&name, &mut ctx.progress).await?;
        self.step(STEPS[5], &STEPS, "Completed creating sparse diskgroup");
        Ok(format!("Sparse diskgroup {name} created"))
    }
}

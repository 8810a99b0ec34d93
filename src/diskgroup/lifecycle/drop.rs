use super::{tier_record, DiskgroupManager, OperationContext};
use crate::diskgroup::error::{DgResult, DiskgroupError, ErrorKind, KindExt};
use crate::diskgroup::gateway::AsmAgent;
use crate::diskgroup::input::{resolve_sparse_record, OperationInput};
use crate::diskgroup::planner::{plan_sizes, PlanInput};
use crate::diskgroup::rollback::RollbackAction;
use crate::diskgroup::types::{DiskgroupRecord, Tier};
use crate::executor::RemoteShell;
use std::collections::BTreeMap;
use tracing::info;

const STEPS: [&str; 5] = [
    "Drop_Diskgroup",
    "Drop_Griddisks",
    "Check_Diskgroups_Resizable",
    "Resize_Griddisks_and_Diskgroups",
    "Complete",
];

impl<S: RemoteShell, A: AsmAgent> DiskgroupManager<'_, S, A> {
    /// Drop the sparse tier and hand its space back to DATA and RECO.
    pub(super) async fn drop_sparse(
        &self,
        input: &OperationInput,
        records: &[DiskgroupRecord],
        ctx: &mut OperationContext,
    ) -> DgResult<String> {
        if !input.is_sparse() {
            return Err(DiskgroupError::new(
                ErrorKind::UnsupportedOption,
                format!("only the sparse diskgroup can be dropped, not {}", input.diskgroup),
            ));
        }
        let sparse = resolve_sparse_record(records).ok_or_else(|| {
            DiskgroupError::new(ErrorKind::DgDoesNotExist, "no sparse or DATA diskgroup is configured")
        })?;
        let name = sparse.name.clone();
        if !self.gateway.exists(&name).await {
            info!("Sparse diskgroup {} does not exist, nothing to drop", name);
            return Ok(format!("Sparse diskgroup {name} does not exist, nothing to do"));
        }

        let data = tier_record(records, Tier::Data)?;
        let reco = tier_record(records, Tier::Reco)?;
        let data_cur = self.gateway.storage(&data.name).await?;
        let reco_cur = self.gateway.storage(&reco.name).await?;
        let sparse_cur = self.gateway.storage(&name).await?;
        let plan = plan_sizes(&PlanInput {
            data_mb: data_cur.total_mb,
            reco_mb: reco_cur.total_mb,
            sparse_mb: Some(sparse_cur.total_mb),
            redundancy: data.redundancy,
            ratio: input.storage_distribution.clone(),
            total_storage_gb: input.total_storage_gb,
            disk_backup_enabled: input.disk_backup_enabled,
            sparse_create: false,
            shrink_existing: true,
        })?;
        let data_new = plan.aligned_data_mb();
        let reco_new = plan.aligned_reco_mb();
        let topology = self.topology(&name).await?;

        self.step(STEPS[0], &STEPS, "Dropping sparse diskgroup");
        ctx.rollback.push(RollbackAction::CreateSparseDiskgroup { record: sparse.clone() });
        self.gateway.drop_diskgroup(&name, input.force_drop).await.map_err(|e| {
            DiskgroupError::new(ErrorKind::DgOperationError, format!("drop of {name} failed: {}", e.detail))
        })?;
        self.store.remove_diskgroup(&name).kind(ErrorKind::UpdateError)?;

        self.step(STEPS[1], &STEPS, "Dropping sparse griddisks");
        ctx.rollback.push(RollbackAction::CreateSparseGridDisks {
            prefix: name.clone(),
            celldisk_type: topology.celldisk_type,
            slice_mb: topology.slice_mb(sparse_cur.total_mb),
        });
        self.griddisks.drop_griddisks(&name, true).await?;

        self.step(STEPS[2], &STEPS, "Checking if DATA and RECO can take the freed space");
        let validator = self.validator();
        validator.check_resizable(&data.name, data_new, None).await?;
        validator.check_resizable(&reco.name, reco_new, None).await?;

        self.step(STEPS[3], &STEPS, "Resizing griddisks and diskgroups");
        self.resize_dg_and_griddisks(ctx, &data.name, data_cur.total_mb, data_new, input.rebalance_power).await?;
        self.resize_dg_and_griddisks(ctx, &reco.name, reco_cur.total_mb, reco_new, input.rebalance_power).await?;

        ctx.rollback.push(RollbackAction::EnsureRebalanced { names: vec![data.name.clone(), reco.name.clone()] });
        self.wait_rebalanced(&data.name, &mut ctx.progress).await?;
        self.wait_rebalanced(&reco.name, &mut ctx.progress).await?;

        let expected = BTreeMap::from([(data.name.clone(), data_cur), (reco.name.clone(), reco_cur)]);
        ctx.rollback.push(RollbackAction::ValidateSizes { expected });
        self.validate_size(&data.name, data_new).await?;
        if reco_new != 0 {
            self.validate_size(&reco.name, reco_new).await?;
        }

        self.step(STEPS[4], &STEPS, "Completed dropping sparse diskgroup");
        Ok(format!("Sparse diskgroup {name} dropped; {} is {data_new} MB, {} is {reco_new} MB", data.name, reco.name))
    }
}

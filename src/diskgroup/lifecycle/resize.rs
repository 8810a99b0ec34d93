use super::{DiskgroupManager, OperationContext};
use crate::diskgroup::error::{DgResult, DiskgroupError, ErrorKind};
use crate::diskgroup::gateway::{mentions_vote_relocation, AsmAgent};
use crate::diskgroup::input::{OperationInput, ALL_DISKGROUPS};
use crate::diskgroup::rollback::RollbackAction;
use crate::diskgroup::types::{DiskgroupRecord, Tier};
use crate::diskgroup::validator::{RebalanceHeadroom, LOW_REBALANCE_POWER};
use crate::executor::RemoteShell;
use tracing::{info, warn};

const SHRINK_STEPS: [&str; 5] = ["DgResize", "Rebalance", "SizeValidation", "GdResize", "Complete"];
const GROW_STEPS: [&str; 5] = ["GdResize", "DgResize", "Rebalance", "SizeValidation", "Complete"];
const ADD_CELL_STEPS: [&str; 2] = ["DgResize", "Complete"];
const REBALANCE_STEPS: [&str; 2] = ["DgRebalance", "Complete"];

impl<S: RemoteShell, A: AsmAgent> DiskgroupManager<'_, S, A> {
    /// Resize one diskgroup to `new_sizeGB`, rounded down to whole aligned slices.
    pub(super) async fn resize(&self, input: &OperationInput, ctx: &mut OperationContext) -> DgResult<String> {
        let name = input.diskgroup.as_str();
        let requested_gb = input
            .new_size_gb
            .ok_or_else(|| DiskgroupError::new(ErrorKind::MissingDiskgroupSize, name.to_string()))?;

        let current = self.gateway.storage(name).await?;
        if current.total_mb == 0 {
            return Err(DiskgroupError::new(
                ErrorKind::InvalidPropValue,
                format!("could not read the current size of {name}"),
            ));
        }
        let requested_mb = requested_gb * 1024;
        if requested_mb == current.total_mb {
            info!("{} is already {} MB", name, requested_mb);
            return Ok("Nothing to do".to_string());
        }

        let topology = self.topology(name).await?;
        let slice = topology.slice_mb(requested_mb);
        if slice == 0 {
            return Err(DiskgroupError::new(
                ErrorKind::InvalidResize,
                format!("{requested_gb} GB leaves no grid disk slice for {name}"),
            ));
        }
        let new_mb = topology.aligned_total_mb(requested_mb);
        let shrink = new_mb < current.total_mb;
        let add_cell = input.is_add_cell_resize();
        let sparse = Tier::from_name(name) == Some(Tier::Sparse);
        info!(
            "Resizing {} from {} MB to {} MB (slice {} MB){}",
            name,
            current.total_mb,
            new_mb,
            slice,
            if add_cell { ", add-cell resize only" } else { "" }
        );

        let validator = self.validator();
        let targets = [(name.to_string(), new_mb)];
        validator.check_size_change_permitted(&targets).await?;
        if !add_cell {
            validator.check_resizable_all(&targets).await?;
        }

        let steps: &[&str] = if add_cell {
            &ADD_CELL_STEPS
        } else if shrink {
            &SHRINK_STEPS
        } else {
            &GROW_STEPS
        };

        if !shrink && !add_cell {
            self.step("GdResize", steps, &format!("Resizing grid disks of {name}"));
            ctx.rollback.push(RollbackAction::ResizeGridDisks { name: name.to_string(), size_mb: current.total_mb });
            self.griddisks.resize_griddisks(&topology, new_mb, sparse).await?;
        }

        self.step("DgResize", steps, &format!("Diskgroup resize operation for {name}"));
        let asm_size = if sparse { self.cfg.to_virtual(slice) } else { slice };
        self.gateway.log_rebalance_estimate(name, asm_size).await;
        let failgroup_list = self.griddisks.failgroup_list(name).await;
        ctx.rollback.push(RollbackAction::ResizeDiskgroup { name: name.to_string(), size_mb: current.total_mb });
        let response = self
            .gateway
            .resize(name, asm_size, &failgroup_list, input.rebalance_power)
            .await
            .map_err(|e| {
                DiskgroupError::new(ErrorKind::UpdateError, format!("error updating diskgroup {name}: {}", e.detail))
            })?;
        self.store_size(name, slice, new_mb)?;
        let relocate_vote_disks = mentions_vote_relocation(&response);
        if relocate_vote_disks {
            info!("Voting disk relocation detected while resizing {}", name);
            ctx.rollback.push(RollbackAction::RelocateVoteDisks);
        }

        if add_cell {
            info!("Add-cell resize of {} submitted; rebalance and grid disks are left to a later step", name);
            self.step("Complete", steps, &format!("Diskgroup resize submitted for {name}"));
            return Ok(format!("{name} resize to {new_mb} MB submitted"));
        }

        self.step("Rebalance", steps, &format!("Rebalance for diskgroup {name} in progress"));
        let rebalanced = self.wait_rebalanced(name, &mut ctx.progress).await;
        if relocate_vote_disks {
            if let Err(e) = self.gateway.relocate_vote_disks().await {
                warn!("Voting disk relocation after resizing {} failed: {}", name, e);
            }
        }
        rebalanced?;

        self.step("SizeValidation", steps, &format!("Validating the size of {name}"));
        self.validate_size(name, new_mb).await?;

        if shrink {
            self.step("GdResize", steps, &format!("Resizing grid disks of {name}"));
            ctx.rollback.push(RollbackAction::ResizeGridDisks { name: name.to_string(), size_mb: current.total_mb });
            self.griddisks.resize_griddisks(&topology, new_mb, sparse).await?;
        }

        self.step("Complete", steps, &format!("{name} resized to {new_mb} MB"));
        Ok(format!("{name} resized successfully to {new_mb} MB"))
    }

    /// Start a rebalance of one diskgroup, or of every tier for `ALL`.
    pub(super) async fn rebalance(&self, input: &OperationInput, records: &[DiskgroupRecord]) -> DgResult<String> {
        let names: Vec<String> = if input.diskgroup.eq_ignore_ascii_case(ALL_DISKGROUPS) {
            records.iter().map(|r| r.name.clone()).collect()
        } else {
            vec![input.diskgroup.clone()]
        };
        if names.is_empty() {
            return Err(DiskgroupError::new(ErrorKind::DgDoesNotExist, "no diskgroups are configured"));
        }
        self.step(REBALANCE_STEPS[0], &REBALANCE_STEPS, &format!("Diskgroup rebalance for {}", names.join(",")));

        let mut power = input.rebalance_power;
        if !input.added_cells.is_empty() {
            let headroom = self
                .validator()
                .rebalance_precheck(&names, input.added_cells.len(), input.cell_disk_size_gb)
                .await?;
            if headroom == RebalanceHeadroom::LowerPower {
                warn!("Rebalance headroom is low, using power {}", LOW_REBALANCE_POWER);
                power = Some(LOW_REBALANCE_POWER);
            }
        }

        self.gateway.rebalance(&names, power).await.map_err(|e| {
            DiskgroupError::new(
                ErrorKind::UpdateError,
                format!("error rebalancing {}: {}", names.join(","), e.detail),
            )
        })?;
        self.step(REBALANCE_STEPS[1], &REBALANCE_STEPS, "Diskgroup rebalance started");
        Ok(format!("Rebalance started for {}", names.join(",")))
    }
}

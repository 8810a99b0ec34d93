use super::error::{DgResult, DiskgroupError, ErrorKind};
use super::gateway::{AsmAgent, AsmGateway};
use super::griddisk::GridDiskExecutor;
use super::types::{align_down, OperationConfig, SizeSnapshot};
use crate::executor::RemoteShell;
use tracing::{error, info, warn};

/// Rebalance power the headroom check assumes.
const PRECHECK_REBALANCE_POWER: u64 = 4;

/// Rebalance power used when a tier has only the bare minimum headroom.
pub const LOW_REBALANCE_POWER: u32 = 1;

/// Grid disks per cell the headroom check assumes.
const DISKS_PER_CELL: u64 = 12;

/// Smallest change of the summed tier sizes, in percent, worth a resize.
const MIN_SIZE_CHANGE_PCT: u64 = 2;

/// Free space left after shrinking to `new_mb`, in percent of `new_mb`.
pub fn free_pct_after(new_mb: u64, used_mb: u64) -> f64 {
    if new_mb == 0 {
        return 0.0;
    }
    (new_mb as f64 - used_mb as f64) * 100.0 / new_mb as f64
}

/// Whether a shrink leaves enough free space: more than 9% with five or more
/// cells, more than 15% with fewer.
pub fn shrink_leaves_enough_free(cell_count: usize, free_pct: f64) -> bool {
    !((cell_count > 4 && free_pct <= 9.0) || (cell_count < 5 && free_pct <= 15.0))
}

/// Summed figures of the tiers that still need cell disk space to grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrowthDemand {
    pub current_mb: u64,
    pub new_mb: u64,
    pub os_mb: u64,
}

impl GrowthDemand {
    /// Current and new per-grid-disk slice, both aligned.
    pub fn slices(&self, cells: usize, celldisks: usize) -> (u64, u64) {
        let parts = (cells * celldisks).max(1) as u64;
        let current = if self.os_mb > 0 { self.os_mb } else { self.current_mb / parts };
        (align_down(current), align_down(self.new_mb / parts))
    }
}

/// Outcome of the rebalance headroom check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceHeadroom {
    Sufficient,
    /// Only enough room at reduced rebalance power.
    LowerPower,
}

/// Headroom a rebalance needs per tier, in MB: (minimum, extra for the new cells).
pub fn rebalance_space_needed(cells: usize, new_cells: usize, disk_size_gb: f64) -> (f64, f64) {
    let need = (64 * cells as u64 * DISKS_PER_CELL * PRECHECK_REBALANCE_POWER) as f64;
    let more = if new_cells > 0 {
        (new_cells as f64 * DISKS_PER_CELL as f64 * disk_size_gb / 1.73 + 2.0) * 3.0 * 4.0
    } else {
        0.0
    };
    (need, more)
}

/// Decide whether sizes may change, before anything is touched.
pub struct Validator<'a, S, A> {
    gateway: &'a AsmGateway<'a, A>,
    griddisks: &'a GridDiskExecutor<'a, S>,
    cfg: &'a OperationConfig,
}

impl<'a, S: RemoteShell, A: AsmAgent> Validator<'a, S, A> {
    pub const fn new(
        gateway: &'a AsmGateway<'a, A>,
        griddisks: &'a GridDiskExecutor<'a, S>,
        cfg: &'a OperationConfig,
    ) -> Self {
        Self { gateway, griddisks, cfg }
    }

    /// Check one tier. Growth that still needs cell disk space is added to `demand`.
    pub async fn check_resizable(
        &self,
        diskgroup: &str,
        new_mb: u64,
        demand: Option<&mut GrowthDemand>,
    ) -> DgResult<SizeSnapshot> {
        let current = self.gateway.storage(diskgroup).await?;
        info!(
            "{}: current {} MB, used {} MB, new {} MB",
            diskgroup, current.total_mb, current.used_mb, new_mb
        );

        if new_mb < current.total_mb {
            let free_pct = free_pct_after(new_mb, current.used_mb);
            let cells = self.griddisks.cell_count();
            info!("Cell count is {}, free space after resize would be {:.2}%", cells, free_pct);
            if !shrink_leaves_enough_free(cells, free_pct) {
                return Err(DiskgroupError::new(
                    ErrorKind::NonModifiable,
                    format!("{diskgroup} does not fulfill the free space percentage criteria for {new_mb} MB"),
                ));
            }
            info!("{} qualifies for resizing", diskgroup);
            return Ok(current);
        }

        let Some(demand) = demand else {
            return Ok(current);
        };
        // A retry after a partial failure may find the grid disks already grown.
        let already_sized = match self.griddisks.griddisks_already_sized(diskgroup, new_mb).await {
            Ok(sized) => sized,
            Err(e) => {
                warn!("Could not read grid disk size of {}: {}", diskgroup, e);
                false
            }
        };
        if already_sized {
            info!("Grid disks of {} already fit {} MB, skipping its cell disk free space check", diskgroup, new_mb);
        } else {
            demand.current_mb += current.total_mb;
            demand.new_mb += new_mb;
            demand.os_mb += current.os_mb;
        }
        Ok(current)
    }

    /// Check every `(diskgroup, new MB)` target, then the cell disks' free space for the growth.
    pub async fn check_resizable_all(&self, targets: &[(String, u64)]) -> DgResult<()> {
        let mut demand = GrowthDemand::default();
        for (name, new_mb) in targets {
            self.check_resizable(name, *new_mb, Some(&mut demand)).await?;
        }
        self.check_cell_free_space(&demand).await
    }

    async fn check_cell_free_space(&self, demand: &GrowthDemand) -> DgResult<()> {
        if !self.cfg.precheck_cell_disk_free_space || demand.new_mb <= demand.current_mb {
            return Ok(());
        }
        let (free_mb, celldisks) = match (self.griddisks.celldisk_free_mb().await, self.griddisks.celldisk_names().await) {
            (Ok(free), Ok(names)) => (free, names.len()),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Skipping cell disk free space check: {}", e);
                return Ok(());
            }
        };

        let (current_slice, new_slice) = demand.slices(self.griddisks.cell_count(), celldisks);
        if new_slice.saturating_sub(current_slice) as f64 > free_mb {
            error!(
                "Free space of {} MB per cell disk is less than needed: slice {} MB -> {} MB",
                free_mb, current_slice, new_slice
            );
            return Err(DiskgroupError::new(
                ErrorKind::NonModifiable,
                format!(
                    "the free storage of {free_mb} MB on each cell disk is less than the requested storage; \
                     current slice {current_slice} MB, requested slice {new_slice} MB"
                ),
            ));
        }
        info!(
            "Cell disk free space check passed: slice {} MB -> {} MB, {} MB free per cell disk",
            current_slice, new_slice, free_mb
        );
        Ok(())
    }

    /// Refuse resizes that change the summed size of `targets` by less than 2%.
    pub async fn check_size_change_permitted(&self, targets: &[(String, u64)]) -> DgResult<()> {
        let mut requested = 0u64;
        let mut current = 0u64;
        for (name, new_mb) in targets {
            requested += new_mb;
            current += self.gateway.storage(name).await?.total_mb;
        }
        if current == 0 {
            return Err(DiskgroupError::new(ErrorKind::InvalidPropValue, "current diskgroup sizes are zero"));
        }
        let change_pct = requested.abs_diff(current) * 100 / current;
        if change_pct < MIN_SIZE_CHANGE_PCT {
            return Err(DiskgroupError::new(
                ErrorKind::DgSizeChangeNotPermitted,
                format!("requested {requested} MB is within {MIN_SIZE_CHANGE_PCT}% of current {current} MB"),
            ));
        }
        Ok(())
    }

    /// Check every tier has room to rebalance onto `new_cells` more cells.
    pub async fn rebalance_precheck(
        &self,
        diskgroups: &[String],
        new_cells: usize,
        disk_size_gb: f64,
    ) -> DgResult<RebalanceHeadroom> {
        let (need, more) = rebalance_space_needed(self.griddisks.cell_count(), new_cells, disk_size_gb);
        let mut headroom = RebalanceHeadroom::Sufficient;
        for name in diskgroups {
            let size = self.gateway.storage(name).await?;
            let available = size.total_mb.saturating_sub(size.used_mb) as f64;
            if available > need + more {
                info!("{}: {} MB free, no change needed for rebalance power", name, available);
            } else if available > need && available < need + more {
                info!("{}: {} MB free, rebalance power lowered to {}", name, available, LOW_REBALANCE_POWER);
                headroom = RebalanceHeadroom::LowerPower;
            } else {
                return Err(DiskgroupError::new(
                    ErrorKind::NonModifiable,
                    format!("rebalance needs {} MB free on {name}, {available} MB available", need + more),
                ));
            }
        }
        Ok(headroom)
    }
}

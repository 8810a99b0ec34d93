use super::error::{DgResult, DiskgroupError, ErrorKind};
use crate::config::AppConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Cells reject sizes that are not a multiple of this many MB.
pub(crate) const SIZE_ALIGNMENT_MB: u64 = 16;

/// One of the three diskgroup tiers of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Data,
    Reco,
    Sparse,
}

impl Tier {
    pub const ALL: [Self; 3] = [Self::Data, Self::Reco, Self::Sparse];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Reco => "reco",
            Self::Sparse => "sparse",
        }
    }

    /// Name prefix used for diskgroups and grid disks of this tier.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Reco => "RECO",
            Self::Sparse => "SPR",
        }
    }

    /// Tier of a diskgroup judged by its name prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        Self::ALL.into_iter().find(|t| upper.starts_with(t.prefix()))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Tier {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "data" => Ok(Self::Data),
            "reco" => Ok(Self::Reco),
            "sparse" => Ok(Self::Sparse),
            _ => Err(format!("invalid diskgroup type: {s}")),
        }
    }
}

/// Sparse diskgroup name derived from the DATA diskgroup name.
pub fn sparse_name_for(data_name: &str) -> String {
    data_name.replacen(Tier::Data.prefix(), Tier::Sparse.prefix(), 1)
}

/// ASM redundancy level of the DATA tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Redundancy {
    External,
    Normal,
    High,
}

impl Redundancy {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "HIGH" => Self::High,
            "NORMAL" => Self::Normal,
            _ => Self::External,
        }
    }

    pub const fn factor(self) -> u64 {
        match self {
            Self::External => 1,
            Self::Normal => 2,
            Self::High => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::External => "EXTERNAL",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
        }
    }
}

/// Per-operation constants, derived from the daemon configuration.
#[derive(Debug, Clone)]
pub struct OperationConfig {
    pub sparse_vsize_factor: u64,
    pub rebalance_poll: Duration,
    pub detailed_progress_interval: Duration,
    pub detailed_progress: bool,
    pub job_poll: Duration,
    pub quorum_retries: u32,
    pub quorum_backoff: Duration,
    pub precheck_cell_disk_free_space: bool,
    pub enable_quorum: bool,
    pub grid_home: String,
    pub asm_sid: String,
}

impl OperationConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            sparse_vsize_factor: config.sparse_vsize_factor.max(1),
            rebalance_poll: Duration::from_secs(config.rebalance_poll_seconds),
            detailed_progress_interval: Duration::from_secs(config.time_check_rebalance_seconds),
            detailed_progress: config.detailed_rebalance_progress,
            job_poll: Duration::from_secs(config.job_poll_seconds),
            quorum_retries: config.quorum_retries,
            quorum_backoff: Duration::from_secs(config.quorum_retry_backoff_seconds),
            precheck_cell_disk_free_space: config.precheck_cell_disk_free_space,
            enable_quorum: config.enable_quorum,
            grid_home: config.grid_home.clone(),
            asm_sid: config.asm_sid.clone(),
        }
    }

    /// Physical MB behind a sparse diskgroup's virtual MB.
    pub const fn to_physical(&self, virtual_mb: u64) -> u64 {
        virtual_mb / self.sparse_vsize_factor
    }

    pub const fn to_virtual(&self, physical_mb: u64) -> u64 {
        physical_mb * self.sparse_vsize_factor
    }

    /// Physical size for a diskgroup name, converting only sparse diskgroups.
    pub fn physical_for(&self, name: &str, mb: u64) -> u64 {
        if Tier::from_name(name) == Some(Tier::Sparse) {
            self.to_physical(mb)
        } else {
            mb
        }
    }
}

/// Round down to the cell's size granularity.
pub const fn align_down(mb: u64) -> u64 {
    mb / SIZE_ALIGNMENT_MB * SIZE_ALIGNMENT_MB
}

/// Per-grid-disk share of a diskgroup size, aligned to 16 MB.
pub const fn slice_size_mb(total_mb: u64, cells: usize, disks_per_cell: usize) -> u64 {
    let parts = (cells * disks_per_cell) as u64;
    if parts == 0 {
        return 0;
    }
    align_down(total_mb / parts)
}

/// Storage figures of one diskgroup as reported by ASM, already physical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeSnapshot {
    pub total_mb: u64,
    pub used_mb: u64,
    pub os_mb: u64,
}

/// Data:Reco[:Sparse] distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatioSpec {
    parts: Vec<u32>,
}

impl RatioSpec {
    /// Parse a colon separated ratio like "35:50:15".
    pub fn parse(value: &str) -> DgResult<Self> {
        let mut parts = Vec::new();
        for piece in value.split(':') {
            let n: u32 = piece.trim().parse().map_err(|_| {
                DiskgroupError::new(
                    ErrorKind::InvalidArgs,
                    format!("storage distribution '{value}' has a non-numeric entry"),
                )
            })?;
            if n == 0 {
                return Err(DiskgroupError::new(
                    ErrorKind::InvalidArgs,
                    format!("storage distribution '{value}' has a zero entry"),
                ));
            }
            parts.push(n);
        }
        if !(2..=3).contains(&parts.len()) {
            return Err(DiskgroupError::new(
                ErrorKind::InvalidArgs,
                format!("storage distribution '{value}' must have 2 or 3 entries"),
            ));
        }
        Ok(Self { parts })
    }

    pub(crate) fn from_parts(parts: &[u32]) -> Self {
        Self { parts: parts.to_vec() }
    }

    pub fn data(&self) -> u32 {
        self.parts[0]
    }

    pub fn reco(&self) -> u32 {
        self.parts[1]
    }

    pub fn sparse(&self) -> Option<u32> {
        self.parts.get(2).copied()
    }

    pub fn has_sparse(&self) -> bool {
        self.parts.len() == 3
    }

    pub fn sum(&self) -> u32 {
        self.parts.iter().sum()
    }
}

impl fmt::Display for RatioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.parts.iter().map(u32::to_string).collect::<Vec<_>>().join(":");
        f.write_str(&joined)
    }
}

/// Target of one tier inside a [`SizePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierTarget {
    pub size_mb: u64,
    pub pct: u32,
}

/// Planned sizes for every tier of one operation.
#[derive(Debug, Clone, Serialize)]
pub struct SizePlan {
    pub ratio: RatioSpec,
    pub current_ratio: RatioSpec,
    pub backup_enabled: bool,
    pub total_mb: u64,
    pub data: TierTarget,
    pub reco: TierTarget,
    pub sparse: Option<TierTarget>,
    /// Physical per-grid-disk slice of the sparse tier, set once topology is known.
    pub sparse_slice_mb: Option<u64>,
}

impl SizePlan {
    /// Targets aligned to the cell granularity, as consumed by validation and resize.
    pub const fn aligned_data_mb(&self) -> u64 {
        align_down(self.data.size_mb)
    }

    pub const fn aligned_reco_mb(&self) -> u64 {
        align_down(self.reco.size_mb)
    }

    pub fn aligned_sparse_mb(&self) -> u64 {
        self.sparse.map_or(0, |s| align_down(s.size_mb))
    }

    /// Record the sparse slice once cell topology has been derived.
    pub fn with_sparse_slice(mut self, cells: usize, disks_per_cell: usize) -> Self {
        self.sparse_slice_mb = Some(slice_size_mb(self.aligned_sparse_mb(), cells, disks_per_cell));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CelldiskType {
    HardDisk,
    FlashDisk,
}

impl CelldiskType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HardDisk => "harddisk",
            Self::FlashDisk => "flashdisk",
        }
    }
}

/// Which grid disks of a diskgroup live on which cell.
#[derive(Debug, Clone, Serialize)]
pub struct CellGridDiskTopology {
    pub diskgroup: String,
    /// Upper-case cell short name to the cell disks carrying the diskgroup's grid disks.
    pub cells: BTreeMap<String, Vec<String>>,
    pub griddisks_per_cell: usize,
    pub celldisk_type: CelldiskType,
}

impl CellGridDiskTopology {
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn slice_mb(&self, total_mb: u64) -> u64 {
        slice_size_mb(total_mb, self.cell_count(), self.griddisks_per_cell)
    }

    /// Total size that a whole number of aligned slices adds up to.
    pub fn aligned_total_mb(&self, total_mb: u64) -> u64 {
        self.slice_mb(total_mb) * (self.cell_count() * self.griddisks_per_cell) as u64
    }
}

/// Rebalance state reported by the ASM agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceStatus {
    Done,
    Incomplete,
    Other(String),
}

impl RebalanceStatus {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "DONE" => Self::Done,
            "INCOMPLETE" => Self::Incomplete,
            _ => Self::Other(value.to_string()),
        }
    }
}

/// Persisted configuration of one diskgroup in the cluster store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskgroupRecord {
    pub id: String,
    pub name: String,
    pub tier: Tier,
    pub size_gb: u64,
    pub slice_size_gb: u64,
    pub sparse_virtual_size_gb: u64,
    pub quorum: bool,
    pub ocr_vote: bool,
    pub redundancy: Redundancy,
    pub sparse: bool,
}

impl DiskgroupRecord {
    /// Sparse record cloned from the DATA record.
    pub fn sparse_from_data(data: &Self) -> Self {
        let id = if data.id.contains(Tier::Data.as_str()) {
            data.id.replace(Tier::Data.as_str(), Tier::Sparse.as_str())
        } else {
            uuid::Uuid::new_v4().to_string()
        };
        Self {
            id,
            name: sparse_name_for(&data.name),
            tier: Tier::Sparse,
            sparse: true,
            ..data.clone()
        }
    }
}

use super::error::{DgResult, DiskgroupError, ErrorKind};
use super::types::{RatioSpec, Redundancy, SizePlan, TierTarget};
use tracing::info;

/// Smallest share of the total the DATA tier may be given.
const MIN_DATA_PCT: u32 = 10;

/// Everything the planner needs to know about the cluster and the request.
#[derive(Debug, Clone)]
pub struct PlanInput {
    /// Current DATA size in MB.
    pub data_mb: u64,
    /// Current RECO size in MB.
    pub reco_mb: u64,
    /// Current physical sparse size in MB, when a sparse tier exists.
    pub sparse_mb: Option<u64>,
    pub redundancy: Redundancy,
    pub ratio: Option<String>,
    pub total_storage_gb: Option<u64>,
    pub disk_backup_enabled: Option<bool>,
    pub sparse_create: bool,
    pub shrink_existing: bool,
}

/// The canonical distribution for a backup/sparse combination.
pub fn default_ratio(backup_enabled: bool, sparse: bool) -> RatioSpec {
    match (backup_enabled, sparse) {
        (true, true) => RatioSpec::from_parts(&[35, 50, 15]),
        (false, true) => RatioSpec::from_parts(&[60, 20, 20]),
        (true, false) => RatioSpec::from_parts(&[40, 60]),
        (false, false) => RatioSpec::from_parts(&[80, 20]),
    }
}

/// Reconstruct the distribution a cluster was deployed with from its DATA/RECO sizes.
///
/// The tolerance bands are intentionally narrow and asymmetric: a backup-enabled
/// cluster must sit within 39/60..=41/60 (two tiers) or strictly inside
/// 34.3/50..36/50 (three tiers); otherwise the integer DATA/RECO quotient must be
/// exactly 3 or 4.
pub fn infer_current_ratio(data_mb: u64, reco_mb: u64) -> DgResult<RatioSpec> {
    if reco_mb == 0 {
        return Err(not_standard(data_mb, reco_mb));
    }
    let quotient = data_mb as f64 / reco_mb as f64;

    if reco_mb > data_mb {
        let r = (quotient * 10_000.0).round_ties_even() / 10_000.0;
        if (39.0 / 60.0..=41.0 / 60.0).contains(&r) {
            return Ok(RatioSpec::from_parts(&[40, 60]));
        }
        if r > 34.3 / 50.0 && r < 36.0 / 50.0 {
            return Ok(RatioSpec::from_parts(&[35, 50, 15]));
        }
        return Err(not_standard(data_mb, reco_mb));
    }

    match quotient.round_ties_even() as u64 {
        3 => Ok(RatioSpec::from_parts(&[60, 20, 20])),
        4 => Ok(RatioSpec::from_parts(&[80, 20])),
        _ => Err(not_standard(data_mb, reco_mb)),
    }
}

fn not_standard(data_mb: u64, reco_mb: u64) -> DiskgroupError {
    DiskgroupError::new(
        ErrorKind::InvalidArgs,
        format!(
            "Current diskgroup ratios are not standard (DATA={data_mb} MB, RECO={reco_mb} MB); \
             provide storage_distribution and total_storagegb"
        ),
    )
}

/// Current aggregate size in GB, before redundancy.
pub fn infer_total_gb(
    data_mb: u64,
    reco_mb: u64,
    sparse_mb: Option<u64>,
    ratio: &RatioSpec,
) -> u64 {
    let sparse = match (sparse_mb, ratio.sparse()) {
        (Some(mb), _) => mb as f64,
        (None, Some(s)) => reco_mb as f64 * f64::from(s) / f64::from(ratio.reco()),
        (None, None) => 0.0,
    };
    ((data_mb as f64 + reco_mb as f64 + sparse) / 1024.0).round_ties_even() as u64
}

/// Compute per-tier targets for an operation.
pub fn plan_sizes(input: &PlanInput) -> DgResult<SizePlan> {
    let backup_enabled = input.disk_backup_enabled.unwrap_or(input.data_mb <= input.reco_mb);

    let ratio = match &input.ratio {
        Some(s) => RatioSpec::parse(s)?,
        None => default_ratio(backup_enabled, input.sparse_create),
    };
    if ratio.has_sparse() != input.sparse_create {
        return Err(DiskgroupError::new(
            ErrorKind::InvalidArgs,
            format!(
                "storage distribution '{}' must have {} entries",
                ratio,
                if input.sparse_create { 3 } else { 2 }
            ),
        ));
    }
    info!(
        "Size planning: backup_enabled={}, sparse_create={}, shrink={}, ratio={}",
        backup_enabled, input.sparse_create, input.shrink_existing, ratio
    );

    let current_ratio = if !input.shrink_existing && input.total_storage_gb.is_none() {
        infer_current_ratio(input.data_mb, input.reco_mb)?
    } else {
        ratio.clone()
    };

    let total_gb = match input.total_storage_gb {
        Some(gb) => gb,
        None => infer_total_gb(input.data_mb, input.reco_mb, input.sparse_mb, &current_ratio),
    };
    let total_mb = total_gb * input.redundancy.factor() * 1024;

    let sum = f64::from(ratio.sum());
    let data_pct = (f64::from(ratio.data()) * 100.0 / sum).round_ties_even() as u32;
    let mut reco_pct = (f64::from(ratio.reco()) * 100.0 / sum).round_ties_even() as u32;
    let sparse_pct = if input.sparse_create {
        Some(100u32.saturating_sub(data_pct + reco_pct))
    } else {
        reco_pct = 100 - data_pct.min(100);
        None
    };

    if data_pct < MIN_DATA_PCT {
        return Err(DiskgroupError::new(
            ErrorKind::InvalidArgs,
            format!("ratio {ratio} gives DATA {data_pct}%, at least {MIN_DATA_PCT}% is required"),
        ));
    }

    let (data_mb, reco_mb) = if input.shrink_existing {
        (u64::from(data_pct) * total_mb / 100, u64::from(reco_pct) * total_mb / 100)
    } else {
        (input.data_mb, input.reco_mb)
    };
    let sparse = sparse_pct.map(|pct| TierTarget {
        size_mb: total_mb.saturating_sub(data_mb + reco_mb),
        pct,
    });

    info!(
        "Planned sizes: total={} MB, DATA={} MB ({}%), RECO={} MB ({}%), SPARSE={} MB",
        total_mb,
        data_mb,
        data_pct,
        reco_mb,
        reco_pct,
        sparse.map_or(0, |s| s.size_mb)
    );

    Ok(SizePlan {
        ratio,
        current_ratio,
        backup_enabled,
        total_mb,
        data: TierTarget { size_mb: data_mb, pct: data_pct },
        reco: TierTarget { size_mb: reco_mb, pct: reco_pct },
        sparse,
        sparse_slice_mb: None,
    })
}

use super::error::{DgResult, DiskgroupError, ErrorKind};
use super::gateway::{PROP_FAILGROUPS, PROP_REBALANCE, PROP_STORAGE};
use super::types::{sparse_name_for, DiskgroupRecord, Tier};
use serde::Serialize;
use serde_json::{Map, Value};

/// `opType` value that turns a precheck into a sparse-creation precheck.
pub const OP_TYPE_ENABLE_SPARSE: &str = "ENABLE_SPARSE";

/// `steps` token of the add-cell workflow's resize-only invocation.
pub const STEP_RESIZE_DGS: &str = "RESIZE_DGS";

/// Name that addresses every configured tier in a rebalance request.
pub const ALL_DISKGROUPS: &str = "ALL";

/// The operations the daemon accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskgroupOp {
    Create,
    UpdateAddSparse,
    Precheck,
    Resize,
    Rebalance,
    Info,
    Drop,
}

impl DiskgroupOp {
    /// Parse an operation name; the `dg_` command form is accepted too.
    pub fn parse(value: &str) -> DgResult<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DiskgroupError::new(
                ErrorKind::DiskGroupLcmInvocationError,
                "no diskgroup operation given",
            ));
        }
        let name = value.to_ascii_lowercase();
        match name.strip_prefix("dg_").unwrap_or(&name) {
            "create" => Ok(Self::Create),
            "update_add_sparse" => Ok(Self::UpdateAddSparse),
            "precheck" => Ok(Self::Precheck),
            "resize" => Ok(Self::Resize),
            "rebalance" => Ok(Self::Rebalance),
            "info" => Ok(Self::Info),
            "drop" => Ok(Self::Drop),
            _ => Err(DiskgroupError::new(
                ErrorKind::InvalidOp,
                format!("DiskGroup LCM step {value} is unsupported"),
            )),
        }
    }

    pub const fn command(self) -> &'static str {
        match self {
            Self::Create => "dg_create",
            Self::UpdateAddSparse => "dg_update_add_sparse",
            Self::Precheck => "dg_precheck",
            Self::Resize => "dg_resize",
            Self::Rebalance => "dg_rebalance",
            Self::Info => "dg_info",
            Self::Drop => "dg_drop",
        }
    }

    /// Operations that may take the name from the DATA tier instead of the payload.
    const fn derives_sparse_name(self) -> bool {
        matches!(self, Self::Create | Self::Precheck)
    }
}

/// Validated request parameters of one operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationInput {
    pub tier: Option<Tier>,
    pub diskgroup: String,
    pub rebalance_power: Option<u32>,
    pub new_size_gb: Option<u64>,
    pub storage_distribution: Option<String>,
    pub disk_backup_enabled: Option<bool>,
    pub total_storage_gb: Option<u64>,
    pub op_type: Option<String>,
    pub force_drop: bool,
    pub shrink: Option<bool>,
    /// Cells being added by an add-cell workflow.
    pub added_cells: Vec<String>,
    /// Workflow steps the caller is running this invocation for.
    pub steps: Vec<String>,
    /// Size of one new cell disk in GB, for the rebalance headroom check.
    pub cell_disk_size_gb: f64,
    pub props: Vec<String>,
}

impl OperationInput {
    pub fn is_sparse(&self) -> bool {
        self.tier == Some(Tier::Sparse)
    }

    /// Resize-only invocation of an add-cell workflow.
    pub fn is_add_cell_resize(&self) -> bool {
        !self.added_cells.is_empty() && self.steps.iter().any(|s| s.eq_ignore_ascii_case(STEP_RESIZE_DGS))
    }

    /// Property set for an info request, defaulting to everything the agent reports.
    pub fn info_props(&self) -> Vec<&str> {
        if self.props.is_empty() {
            vec![PROP_STORAGE, PROP_FAILGROUPS, PROP_REBALANCE]
        } else {
            self.props.iter().map(String::as_str).collect()
        }
    }
}

/// Case-insensitive key lookup; `exact` keys must match verbatim.
fn lookup<'v>(payload: &'v Map<String, Value>, key: &str, exact: bool) -> Option<&'v Value> {
    if exact {
        return payload.get(key).filter(|v| !v.is_null());
    }
    payload
        .iter()
        .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_null())
        .map(|(_, v)| v)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value, key: &str) -> DgResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite() && *n >= 0.0).ok_or_else(|| {
        DiskgroupError::new(ErrorKind::InvalidArgs, format!("{key} must be a non-negative number, got {value}"))
    })
}

fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_u64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::String(s) => crate::config::split_list(s),
        _ => Vec::new(),
    }
}

/// Resolve the sparse tier a drop addresses, synthesizing it from DATA if it was never recorded.
pub fn resolve_sparse_record(records: &[DiskgroupRecord]) -> Option<DiskgroupRecord> {
    if let Some(sparse) = records.iter().find(|r| r.tier == Tier::Sparse) {
        return Some(sparse.clone());
    }
    records.iter().find(|r| r.tier == Tier::Data).map(DiskgroupRecord::sparse_from_data)
}

/// Validate the request payload of `op` against the configured tiers.
pub fn parse_input(
    op: DiskgroupOp,
    payload: Option<&Value>,
    records: &[DiskgroupRecord],
) -> DgResult<OperationInput> {
    let payload = payload.and_then(Value::as_object).ok_or_else(|| {
        DiskgroupError::new(ErrorKind::MissingInputPayload, format!("{} needs a JSON object", op.command()))
    })?;

    let text = |key: &str| lookup(payload, key, false).and_then(as_text);

    let mut input = OperationInput {
        diskgroup: text("diskgroup").unwrap_or_default(),
        op_type: text("opType"),
        storage_distribution: lookup(payload, "storage_distribution", true).and_then(as_text),
        force_drop: lookup(payload, "force_drop", false).is_some_and(as_flag),
        shrink: lookup(payload, "shrink", false).map(as_flag),
        added_cells: lookup(payload, "added_cells", false).map(as_list).unwrap_or_default(),
        steps: lookup(payload, "steps", false).map(as_list).unwrap_or_default(),
        props: lookup(payload, "props", false).map(as_list).unwrap_or_default(),
        disk_backup_enabled: text("disk_backup_enabled").map(|v| v.eq_ignore_ascii_case("TRUE")),
        ..OperationInput::default()
    };

    if let Some(kind) = text("diskgroup_type") {
        let tier = Tier::try_from(kind.as_str()).map_err(|e| DiskgroupError::new(ErrorKind::InvalidArgs, e))?;
        input.tier = Some(tier);
    }
    if let Some(v) = lookup(payload, "rebalance_power", false) {
        input.rebalance_power = Some(as_number(v, "rebalance_power")? as u32);
    }
    if let Some(v) = lookup(payload, "new_sizeGB", false) {
        input.new_size_gb = Some(as_number(v, "new_sizeGB")? as u64).filter(|gb| *gb > 0);
    }
    if let Some(v) = lookup(payload, "total_storagegb", true) {
        input.total_storage_gb = Some(as_number(v, "total_storagegb")? as u64);
    }
    if let Some(v) = lookup(payload, "cell_disk_size", false) {
        input.cell_disk_size_gb = as_number(v, "cell_disk_size")?;
    }

    match op {
        DiskgroupOp::Create | DiskgroupOp::UpdateAddSparse if input.tier.is_none() => {
            return Err(DiskgroupError::new(ErrorKind::MissingDiskgroupType, op.command()));
        }
        DiskgroupOp::Resize if input.new_size_gb.is_none() => {
            return Err(DiskgroupError::new(ErrorKind::MissingDiskgroupSize, op.command()));
        }
        DiskgroupOp::Precheck => {
            if input.op_type.as_deref() != Some(OP_TYPE_ENABLE_SPARSE) {
                return Err(DiskgroupError::new(
                    ErrorKind::MissingArgs,
                    format!("opType must be {OP_TYPE_ENABLE_SPARSE} for {}", op.command()),
                ));
            }
            input.tier = Some(Tier::Sparse);
        }
        DiskgroupOp::Drop if input.is_sparse() => {
            let sparse = resolve_sparse_record(records).ok_or_else(|| {
                DiskgroupError::new(ErrorKind::DgDoesNotExist, "no sparse or DATA diskgroup is configured")
            })?;
            input.diskgroup = sparse.name;
        }
        _ => {}
    }

    if input.diskgroup.is_empty() {
        if input.is_sparse() && op.derives_sparse_name() {
            let data = records.iter().find(|r| r.tier == Tier::Data).ok_or_else(|| {
                DiskgroupError::new(ErrorKind::DgDoesNotExist, "no DATA diskgroup to derive the sparse name from")
            })?;
            input.diskgroup = sparse_name_for(&data.name);
        } else {
            return Err(DiskgroupError::new(ErrorKind::MissingDiskgroupName, op.command()));
        }
    }
    Ok(input)
}

use serde::{Deserialize, Serialize};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) const fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub(crate) fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }
}

/// Query string of GET /api/operations.
#[derive(Debug, Deserialize)]
pub(crate) struct OperationListQuery {
    pub limit: Option<u32>,
}

/// Returned by POST /api/diskgroup/{op} once the operation is queued.
#[derive(Debug, Serialize)]
pub(crate) struct OperationStarted {
    pub operation_id: i64,
    pub command: String,
}

/// Request body for POST /api/cluster/diskgroups.
#[derive(Debug, Deserialize)]
pub(crate) struct RegisterDiskgroupRequest {
    pub name: String,
    pub id: Option<String>,
    pub size_gb: Option<u64>,
    pub slice_size_gb: Option<u64>,
    pub redundancy: Option<String>,
    pub quorum: Option<bool>,
    pub ocr_vote: Option<bool>,
}

/// Request body for POST /api/settings.
#[derive(Debug, Deserialize)]
pub(crate) struct SettingsUpdateRequest {
    pub cell_hosts: Option<Vec<String>>,
    pub asm_nodes: Option<Vec<String>>,
    pub ssh_user: Option<String>,
    pub sparse_vsize_factor: Option<u64>,
    pub rebalance_poll_seconds: Option<u64>,
    pub time_check_rebalance_seconds: Option<u64>,
    pub detailed_rebalance_progress: Option<bool>,
    pub job_poll_seconds: Option<u64>,
    pub quorum_retries: Option<u32>,
    pub precheck_cell_disk_free_space: Option<bool>,
    pub enable_quorum: Option<bool>,
}

/// Response of GET /api/status.
#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    pub state: crate::DaemonState,
    pub operation_id: Option<i64>,
    pub detail: Option<String>,
    pub version: String,
}

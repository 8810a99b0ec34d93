use crate::api::responses::{ApiResponse, SettingsUpdateRequest};
use crate::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

pub(crate) async fn get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.config.clone()))
}

pub(crate) async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SettingsUpdateRequest>,
) -> impl IntoResponse {
    let mut config = state.config.clone();

    if let Some(v) = req.cell_hosts {
        config.cell_hosts = v;
    }
    if let Some(v) = req.asm_nodes {
        config.asm_nodes = v;
    }
    if let Some(v) = req.ssh_user {
        config.ssh_user = v;
    }
    if let Some(v) = req.sparse_vsize_factor {
        config.sparse_vsize_factor = v;
    }
    if let Some(v) = req.rebalance_poll_seconds {
        config.rebalance_poll_seconds = v;
    }
    if let Some(v) = req.time_check_rebalance_seconds {
        config.time_check_rebalance_seconds = v;
    }
    if let Some(v) = req.detailed_rebalance_progress {
        config.detailed_rebalance_progress = v;
    }
    if let Some(v) = req.job_poll_seconds {
        config.job_poll_seconds = v;
    }
    if let Some(v) = req.quorum_retries {
        config.quorum_retries = v;
    }
    if let Some(v) = req.precheck_cell_disk_free_space {
        config.precheck_cell_disk_free_space = v;
    }
    if let Some(v) = req.enable_quorum {
        config.enable_quorum = v;
    }

    if let Err(e) = config.validate() {
        return Json(ApiResponse::<&str>::err(format!("Invalid settings: {e}")));
    }

    match config.save() {
        Ok(()) => Json(ApiResponse::ok("Settings saved (restart to apply)")),
        Err(e) => Json(ApiResponse::<&str>::err(format!("Failed to save settings: {e}"))),
    }
}

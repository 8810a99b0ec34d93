use crate::api::responses::{ApiResponse, RegisterDiskgroupRequest};
use crate::diskgroup::{DiskgroupRecord, Redundancy, Tier};
use crate::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::info;

/// Configured diskgroups of the cluster, DATA first.
pub(crate) async fn get_diskgroups(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.list_diskgroups() {
        Ok(records) => Json(ApiResponse::ok(records)),
        Err(e) => Json(ApiResponse::<Vec<DiskgroupRecord>>::err(format!("{e:#}"))),
    }
}

/// Register (or replace) a diskgroup in the cluster store; the tier follows from the name prefix.
pub(crate) async fn register_diskgroup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDiskgroupRequest>,
) -> impl IntoResponse {
    let name = req.name.trim().to_ascii_uppercase();
    let Some(tier) = Tier::from_name(&name) else {
        return Json(ApiResponse::<DiskgroupRecord>::err(format!(
            "Diskgroup name {name} does not start with DATA, RECO or SPR"
        )));
    };

    let record = DiskgroupRecord {
        id: req.id.unwrap_or_else(|| tier.as_str().to_string()),
        name,
        tier,
        size_gb: req.size_gb.unwrap_or(0),
        slice_size_gb: req.slice_size_gb.unwrap_or(0),
        sparse_virtual_size_gb: 0,
        quorum: req.quorum.unwrap_or(false),
        ocr_vote: req.ocr_vote.unwrap_or(false),
        redundancy: req.redundancy.as_deref().map_or(Redundancy::Normal, Redundancy::parse),
        sparse: tier == Tier::Sparse,
    };

    match state.db.upsert_diskgroup(&record) {
        Ok(()) => {
            info!("Registered diskgroup {} ({})", record.name, record.tier);
            Json(ApiResponse::ok(record))
        }
        Err(e) => Json(ApiResponse::err(format!("{e:#}"))),
    }
}

use crate::api::responses::{ApiResponse, OperationListQuery, OperationStarted};
use crate::db::{OperationRecord, OperationStatus};
use crate::diskgroup::gateway::{AgentPaths, DbaasAgent};
use crate::diskgroup::input::DiskgroupOp;
use crate::diskgroup::{DiskgroupManager, OperationConfig, OperationResult};
use crate::events::Event;
use crate::executor::SshShell;
use crate::state::OperationReporter;
use crate::{AppState, DaemonState, DaemonStatus};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_LIST_LIMIT: u32 = 50;

/// Queue one diskgroup operation. The body is the operation's JSON payload and may be empty.
pub(crate) async fn start_operation(
    State(state): State<Arc<AppState>>,
    Path(op): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let op = match DiskgroupOp::parse(&op) {
        Ok(op) => op,
        Err(e) => return Json(ApiResponse::<OperationStarted>::err(e.log_line())),
    };
    let payload: Option<Value> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => Some(v),
            Err(e) => return Json(ApiResponse::<OperationStarted>::err(format!("Invalid JSON payload: {e}"))),
        }
    };

    if state.config.asm_nodes.is_empty() {
        return Json(ApiResponse::<OperationStarted>::err("No ASM node is configured"));
    }

    // Held across the check and the status update so two requests cannot both start.
    let mut status = state.status.write().await;
    if status.state != DaemonState::Idle {
        return Json(ApiResponse::<OperationStarted>::err(format!(
            "Cannot start {}: operation {} is still running",
            op.command(),
            status.operation_id.map_or_else(|| "?".to_string(), |id| id.to_string())
        )));
    }

    let diskgroup = payload.as_ref().and_then(|p| p.get("diskgroup")).and_then(Value::as_str);
    let operation_id = match state.db.create_operation(op.command(), diskgroup) {
        Ok(id) => id,
        Err(e) => return Json(ApiResponse::<OperationStarted>::err(format!("{e:#}"))),
    };
    *status = DaemonStatus::running(operation_id, format!("Running {}", op.command()));
    drop(status);

    let token = state.new_operation_token().await;
    let state_clone = state.clone();
    let handle = tokio::spawn(async move {
        let result = AssertUnwindSafe(run_operation(&state_clone, operation_id, op, payload.as_ref(), token))
            .catch_unwind()
            .await;

        let (status, error_code, log) = match &result {
            Ok(outcome) if outcome.passed() => (OperationStatus::Passed, outcome.error_code, outcome.log.clone()),
            Ok(outcome) => (OperationStatus::Failed, outcome.error_code, outcome.log.clone()),
            Err(_) => {
                error!("Operation {} panicked!", operation_id);
                let _ = state_clone.event_hub.publish(Event::DaemonError {
                    message: format!("Operation {operation_id} panicked"),
                });
                (OperationStatus::Failed, 0, "Operation panicked".to_string())
            }
        };
        let data = result.as_ref().ok().and_then(|o| o.data.as_ref());
        if let Err(e) = state_clone.db.finish_operation(operation_id, status, error_code, &log, data) {
            error!("Could not record the outcome of operation {}: {:#}", operation_id, e);
        }
        let _ = state_clone.event_hub.publish(Event::OperationComplete {
            operation_id,
            status: status.to_string(),
            error_code,
            log,
        });

        // Always reset to idle, panic or not.
        *state_clone.status.write().await = DaemonStatus::idle();
        *state_clone.background_task.lock().await = None;
    });

    *state.background_task.lock().await = Some(handle);

    Json(ApiResponse::ok(OperationStarted { operation_id, command: op.command().to_string() }))
}

/// Build the remote plumbing for one operation and run it to completion.
async fn run_operation(
    state: &Arc<AppState>,
    operation_id: i64,
    op: DiskgroupOp,
    payload: Option<&Value>,
    cancel: CancellationToken,
) -> OperationResult {
    let config = &state.config;
    let cfg = OperationConfig::from_app(config);
    let shell = SshShell::new(config.ssh_user.clone());
    let asm_node = config.asm_nodes.first().map(String::as_str);
    let agent = DbaasAgent::new(&shell, asm_node.unwrap_or_default(), AgentPaths::from_app(config), cfg.job_poll);
    let reporter = OperationReporter::new(state.clone(), operation_id);

    info!("Operation {} ({}) started", operation_id, op.command());
    let manager = DiskgroupManager::new(&shell, &agent, &config.cell_hosts, &state.db, &cfg)
        .with_asm_node(asm_node)
        .with_reporter(&reporter)
        .with_cancel(cancel);
    let outcome = manager.run(op.command(), payload).await;
    info!("Operation {} finished with status {:?}", operation_id, outcome.status);
    outcome
}

pub(crate) async fn list_operations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OperationListQuery>,
) -> impl IntoResponse {
    match state.db.list_operations(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)) {
        Ok(ops) => Json(ApiResponse::ok(ops)),
        Err(e) => Json(ApiResponse::<Vec<OperationRecord>>::err(format!("{e:#}"))),
    }
}

pub(crate) async fn get_operation(
    State(state): State<Arc<AppState>>,
    Path(operation_id): Path<i64>,
) -> impl IntoResponse {
    match state.db.get_operation(operation_id) {
        Ok(Some(op)) => Json(ApiResponse::ok(op)),
        Ok(None) => Json(ApiResponse::<OperationRecord>::err("Operation not found")),
        Err(e) => Json(ApiResponse::<OperationRecord>::err(format!("{e:#}"))),
    }
}

/// Cancel the running operation's rebalance wait.
pub(crate) async fn cancel_operation(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.status.read().await.state == DaemonState::Idle {
        return Json(ApiResponse::<&str>::err("No operation is running"));
    }
    state.request_cancel().await;
    Json(ApiResponse::ok("Cancellation requested"))
}

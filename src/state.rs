use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::AppConfig;
use crate::db::Database;
use crate::diskgroup::ProgressReporter;
use crate::events::{Event, EventHub};

/// Shared application state passed to all API handlers via axum's State extractor.
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub event_hub: EventHub,
    pub status: tokio::sync::RwLock<DaemonStatus>,
    /// Per-operation cancellation token, replaced on each new operation.
    cancel_token: tokio::sync::Mutex<CancellationToken>,
    /// Handle to the operation task currently running, if any.
    pub background_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig, event_hub: EventHub) -> Self {
        Self {
            db,
            config,
            event_hub,
            status: tokio::sync::RwLock::new(DaemonStatus::idle()),
            cancel_token: tokio::sync::Mutex::new(CancellationToken::new()),
            background_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Create a fresh `CancellationToken` for a new operation.
    pub async fn new_operation_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel_token.lock().await = token.clone();
        token
    }

    /// Cancel the current operation. Idempotent.
    pub async fn request_cancel(&self) {
        self.cancel_token.lock().await.cancel();
    }
}

/// The daemon's operating state, serialized to the API as a lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub state: DaemonState,
    pub operation_id: Option<i64>,
    pub detail: Option<String>,
}

impl DaemonStatus {
    pub const fn idle() -> Self {
        Self { state: DaemonState::Idle, operation_id: None, detail: None }
    }

    pub fn running(operation_id: i64, detail: impl Into<String>) -> Self {
        Self { state: DaemonState::Running, operation_id: Some(operation_id), detail: Some(detail.into()) }
    }
}

/// Writes an operation's progress to its row and to the event hub.
pub struct OperationReporter {
    state: Arc<AppState>,
    operation_id: i64,
}

impl OperationReporter {
    pub const fn new(state: Arc<AppState>, operation_id: i64) -> Self {
        Self { state, operation_id }
    }
}

impl ProgressReporter for OperationReporter {
    fn step(&self, current: &str, steps: &[&str], message: &str) {
        if let Err(e) = self.state.db.update_operation_step(self.operation_id, steps, current) {
            warn!("Could not record step {} of operation {}: {:#}", current, self.operation_id, e);
        }
        let _ = self.state.event_hub.publish(Event::StepChanged {
            operation_id: self.operation_id,
            step: current.to_string(),
            steps: steps.iter().map(ToString::to_string).collect(),
            message: message.to_string(),
            at: Utc::now(),
        });
    }

    fn rebalance_progress(&self, progress: &Value) {
        if let Err(e) = self.state.db.update_operation_progress(self.operation_id, progress) {
            warn!("Could not record rebalance progress of operation {}: {:#}", self.operation_id, e);
        }
        let _ = self.state.event_hub.publish(Event::RebalanceProgress {
            operation_id: self.operation_id,
            progress: progress.clone(),
            at: Utc::now(),
        });
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Events that flow from running operations to SSE subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    /// An operation entered a new step.
    StepChanged {
        operation_id: i64,
        step: String,
        /// Every step of the operation, in order.
        steps: Vec<String>,
        message: String,
        at: DateTime<Utc>,
    },

    /// A rebalance progress document, as persisted on the operation row.
    RebalanceProgress { operation_id: i64, progress: Value, at: DateTime<Utc> },

    /// An operation finished, passed or failed.
    OperationComplete {
        operation_id: i64,
        status: String, // "passed" | "failed"
        error_code: u32,
        log: String,
    },

    /// A generic error event.
    DaemonError { message: String },
}

impl Event {
    /// Returns the SSE event type name for this event variant.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::StepChanged { .. } => "step_changed",
            Self::RebalanceProgress { .. } => "rebalance_progress",
            Self::OperationComplete { .. } => "operation_complete",
            Self::DaemonError { .. } => "daemon_error",
        }
    }
}

/// The central event broadcast hub.
///
/// Operation tasks publish; the SSE handler subscribes and forwards.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Event>,
}

impl EventHub {
    /// Subscribers lagging more than `capacity` events get `Lagged` and skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Fire-and-forget: `Err` only means nobody is listening.
    pub fn publish(&self, event: Event) -> Result<usize, broadcast::error::SendError<Event>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

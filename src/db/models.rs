use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Status of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Running,
    Passed,
    Failed,
}

impl OperationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for OperationStatus {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "running" => Ok(Self::Running),
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid operation status: {s}")),
        }
    }
}

/// One lifecycle operation as recorded in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: i64,
    pub command: String,
    pub diskgroup: Option<String>,
    pub status: OperationStatus,
    pub steps: Vec<String>,
    pub current_step: Option<String>,
    pub error_code: u32,
    pub log: Option<String>,
    /// Last rebalance progress document.
    pub progress: Option<Value>,
    /// Data returned by the operation (info properties, precheck verdict).
    pub result: Option<Value>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

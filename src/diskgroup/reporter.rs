use serde_json::Value;

/// Sink for externally visible progress of the running operation.
pub trait ProgressReporter: Send + Sync {
    /// The operation entered `current`, one of `steps`.
    fn step(&self, current: &str, steps: &[&str], message: &str);

    /// A rebalance progress document was computed.
    fn rebalance_progress(&self, progress: &Value);
}

/// Reporter that drops everything.
impl ProgressReporter for () {
    fn step(&self, _current: &str, _steps: &[&str], _message: &str) {}

    fn rebalance_progress(&self, _progress: &Value) {}
}

use super::fakes::{new_log, test_config, FakeAgent, FakeShell};
use crate::diskgroup::gateway::AsmGateway;
use crate::diskgroup::monitor::{
    parse_group_name, parse_run_rows, progress_json, sqlplus_command, RebalanceMonitor, RebalanceProgressState,
};
use crate::diskgroup::{ErrorKind, ProgressReporter};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RUN_OUTPUT: &str = "
GROUP_NUMBER STATE  POWER EST_MINUTES SOFAR EST_WORK
------------ ----- ------ ----------- ----- --------
           1 RUN        4          12    50      100
           2 RUN        4           3    90      100
";

#[derive(Default)]
struct RecordingReporter {
    steps: Mutex<Vec<String>>,
    progress: Mutex<Vec<Value>>,
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, current: &str, _steps: &[&str], _message: &str) {
        self.steps.lock().unwrap().push(current.to_string());
    }

    fn rebalance_progress(&self, progress: &Value) {
        self.progress.lock().unwrap().push(progress.clone());
    }
}

fn names() -> BTreeMap<String, String> {
    BTreeMap::from([("1".to_string(), "DATAC1".to_string()), ("2".to_string(), "RECOC1".to_string())])
}

#[test]
fn test_parse_run_rows() {
    let rows = parse_run_rows(RUN_OUTPUT);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].group, "1");
    assert_eq!(rows[0].power, "4");
    assert!((rows[0].eta_mins - 12.0).abs() < f64::EPSILON);
    assert!((rows[0].percent_done - 50.0).abs() < f64::EPSILON);
    assert!((rows[1].percent_done - 90.0).abs() < f64::EPSILON);

    assert!(parse_run_rows("no rows selected").is_empty());
    // Nothing done yet reads as zero, not NaN.
    let idle = parse_run_rows("1 RUN 4 0 0 0");
    assert!(idle[0].percent_done.abs() < f64::EPSILON);
}

#[test]
fn test_parse_group_name() {
    let out = "GROUP_NUMBER NAME\n------------ ------\n           1 DATAC1\n";
    assert_eq!(parse_group_name(out).as_deref(), Some("DATAC1"));
    assert_eq!(parse_group_name("           3 SPRC1").as_deref(), Some("SPRC1"));
    assert!(parse_group_name("no rows selected").is_none());
}

#[test]
fn test_reported_progress_never_decreases() {
    let weights = vec![("DATAC1".to_string(), 100)];
    let mut state = RebalanceProgressState::new();

    state.record_poll(&parse_run_rows("1 RUN 4 10 50 100"), &names());
    assert_eq!(state.report(&weights), 50);

    // The averaged figure drops to 30, the reported one stays put.
    state.record_poll(&parse_run_rows("1 RUN 4 10 10 100"), &names());
    assert_eq!(state.overall(&weights), 30);
    assert_eq!(state.report(&weights), 50);

    // No longer running means finished.
    state.record_poll(&[], &names());
    assert_eq!(state.report(&weights), 100);
    assert_eq!(state.reported_percent(), 100);
}

#[test]
fn test_progress_is_weighted_by_configured_size() {
    let weights = vec![("DATAC1".to_string(), 300), ("RECOC1".to_string(), 100)];
    let mut state = RebalanceProgressState::new();
    let details = state.record_poll(&parse_run_rows(RUN_OUTPUT), &names());

    // 50% of 3/4 plus 90% of 1/4.
    assert_eq!(state.overall(&weights), 60);
    assert_eq!(details.len(), 2);
    assert_eq!(details[0]["name"], "DATAC1");
    assert_eq!(details[0]["est_time_remaining"], "720");
    assert_eq!(details[0]["Rebalance_power"], "4");
    assert_eq!(details[0]["percentage_task_completed"], 50);
    assert_eq!(details[1]["status"], "ONGOING");
}

#[test]
fn test_progress_json_shape() {
    let doc = progress_json(vec![json!({"name": "DATAC1"})], 42);
    let step = &doc["stepProgressDetails"];
    assert_eq!(step["percent_complete"], 42);
    assert_eq!(step["status"], "InProgress");
    assert_eq!(step["stepSpecificDetails"]["diskgroup_rbal_details"][0]["name"], "DATAC1");
}

#[test]
fn test_sqlplus_command_escapes_dollar() {
    let cmd = sqlplus_command("/u01/grid", "+ASM1", "select * from GV$ASM_OPERATION;");
    assert!(cmd.starts_with("su - grid -c"));
    assert!(cmd.contains("ORACLE_HOME=/u01/grid"));
    assert!(cmd.contains("ORACLE_SID=+ASM1"));
    assert!(cmd.contains("sqlplus -s / as sysasm"));
    assert!(!cmd.contains("GV$ASM"));
}

#[tokio::test]
async fn test_wait_publishes_detailed_progress() {
    let log = new_log();
    let shell = FakeShell::new(log.clone())
        .respond("OPERATION, PASS", "1 REBAL RUN RUN 10 100 5 4")
        .respond("where STATE='RUN'", "1 RUN 4 5 25 100")
        .respond("ASM_DISKGROUP where GROUP_NUMBER", "1 DATAC1");
    let agent = FakeAgent::new(log.clone())
        .with_diskgroup("DATAC1", 102_400, 20_000, 25_600)
        .with_rebalance_states(&["INCOMPLETE"]);
    let mut cfg = test_config();
    cfg.detailed_progress = true;
    let gateway = AsmGateway::new(&agent, &cfg);
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();
    let monitor = RebalanceMonitor::new(&shell, &gateway, Some("node1"), &cfg, &reporter, &cancel);

    let mut state = RebalanceProgressState::new();
    monitor
        .wait_until_rebalanced("DATAC1", &mut state, &[("DATAC1".to_string(), 100)])
        .await
        .unwrap();

    let progress = reporter.progress.lock().unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0]["stepProgressDetails"]["percent_complete"], 25);
    assert_eq!(state.percent_of("DATAC1"), Some(25.0));
}

#[tokio::test]
async fn test_wait_stops_when_no_operation_is_left() {
    let log = new_log();
    let shell = FakeShell::new(log.clone()).respond("OPERATION, PASS", "\nno rows selected\n");
    let agent = FakeAgent::new(log.clone())
        .with_diskgroup("DATAC1", 102_400, 20_000, 25_600)
        .with_rebalance_states(&["INCOMPLETE", "INCOMPLETE", "INCOMPLETE"]);
    let mut cfg = test_config();
    cfg.detailed_progress = true;
    let gateway = AsmGateway::new(&agent, &cfg);
    let cancel = CancellationToken::new();
    let monitor = RebalanceMonitor::new(&shell, &gateway, Some("node1"), &cfg, &(), &cancel);

    let mut state = RebalanceProgressState::new();
    monitor.wait_until_rebalanced("DATAC1", &mut state, &[]).await.unwrap();
    // One status query was enough.
    assert_eq!(agent.submits(), 1);
}

#[tokio::test]
async fn test_wait_is_cancellable() {
    let log = new_log();
    let shell = FakeShell::new(log.clone());
    let agent = FakeAgent::new(log)
        .with_diskgroup("DATAC1", 102_400, 20_000, 25_600)
        .with_rebalance_states(&["INCOMPLETE"]);
    let mut cfg = test_config();
    cfg.rebalance_poll = Duration::from_secs(3600);
    let gateway = AsmGateway::new(&agent, &cfg);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let monitor = RebalanceMonitor::new(&shell, &gateway, None, &cfg, &(), &cancel);

    let mut state = RebalanceProgressState::new();
    let err = monitor.wait_until_rebalanced("DATAC1", &mut state, &[]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::DgOperationError);
}

use super::fakes::{calls, new_log, test_config, FakeAgent, FakeShell};
use crate::diskgroup::gateway::{
    mentions_vote_relocation, parse_rebalance_status, parse_storage, AgentPaths, AgentResponse, AsmAction, AsmAgent,
    AsmGateway, AsmRequest, DbaasAgent,
};
use crate::diskgroup::types::RebalanceStatus;
use crate::diskgroup::{ErrorKind, Tier};
use serde_json::json;
use std::time::Duration;

fn paths() -> AgentPaths {
    AgentPaths {
        bin: "/opt/dbaasapi".to_string(),
        request_dir: "/var/dbaas/req".to_string(),
        grid_log_dir: "/var/dbaas/grid".to_string(),
        staging_dir: std::env::temp_dir().to_string_lossy().into_owned(),
    }
}

#[test]
fn test_parse_storage_accepts_strings_and_scientific_notation() {
    let info = json!({"DATAC1": {"dg_storage_props": {"total_mb": "1.024E+05", "used_mb": 20000}}});
    let size = parse_storage(&info, "DATAC1").unwrap();
    assert_eq!(size.total_mb, 102_400);
    assert_eq!(size.used_mb, 20_000);
    assert_eq!(size.os_mb, 0);
}

#[test]
fn test_parse_storage_errors() {
    assert_eq!(parse_storage(&json!({}), "DATAC1").unwrap_err().kind, ErrorKind::NullOutputPayload);
    assert_eq!(
        parse_storage(&json!({"RECOC1": {}}), "DATAC1").unwrap_err().kind,
        ErrorKind::MissingPropDict
    );
    assert_eq!(
        parse_storage(&json!({"DATAC1": {"failgroups": {}}}), "DATAC1").unwrap_err().kind,
        ErrorKind::MissingStorPropDict
    );
    assert_eq!(
        parse_storage(&json!({"DATAC1": {"dg_storage_props": {"total_mb": 1}}}), "DATAC1").unwrap_err().kind,
        ErrorKind::MissingStorProp
    );
}

#[test]
fn test_parse_rebalance_status() {
    let info = json!({"DATAC1": {"rebalance_status": {"status": "done"}}});
    assert_eq!(parse_rebalance_status(&info, "DATAC1").unwrap(), RebalanceStatus::Done);

    let info = json!({"DATAC1": {"rebalance_status": {"status": "INCOMPLETE"}}});
    assert_eq!(parse_rebalance_status(&info, "DATAC1").unwrap(), RebalanceStatus::Incomplete);

    let info = json!({"DATAC1": {"rebalance_status": {"status": ""}}});
    assert_eq!(parse_rebalance_status(&info, "DATAC1").unwrap_err().kind, ErrorKind::MissingReblProp);
}

#[test]
fn test_vote_relocation_detection() {
    let moving = AgentResponse { status: "Success".into(), msg: "voting files relocating".into(), errmsg: String::new() };
    assert!(mentions_vote_relocation(&moving));
    assert!(!mentions_vote_relocation(&AgentResponse::default()));
}

#[tokio::test]
async fn test_quorum_unavailable_is_retried() {
    let log = new_log();
    let agent = FakeAgent::new(log.clone()).with_quorum_failures(2);
    let cfg = test_config();
    let gateway = AsmGateway::new(&agent, &cfg);

    gateway.create("SPRC1", Tier::Sparse).await.unwrap();
    assert_eq!(agent.submits(), 3);
    assert_eq!(calls(&log).iter().filter(|c| *c == "asm create SPRC1").count(), 3);
}

#[tokio::test]
async fn test_quorum_retries_are_bounded() {
    let log = new_log();
    let agent = FakeAgent::new(log).with_quorum_failures(3);
    let cfg = test_config();
    let gateway = AsmGateway::new(&agent, &cfg);

    let err = gateway.create("SPRC1", Tier::Sparse).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::DbaasApiFail);
    assert!(err.detail.contains("ORA-15025"));
    assert_eq!(agent.submits(), 3);
}

#[tokio::test]
async fn test_sparse_storage_is_reported_physical() {
    let log = new_log();
    let agent = FakeAgent::new(log).with_diskgroup("SPRC1", 18_124_800, 1_000_000, 4_531_200);
    let cfg = test_config();
    let gateway = AsmGateway::new(&agent, &cfg);

    let size = gateway.storage("SPRC1").await.unwrap();
    assert_eq!(size.total_mb, 1_812_480);
    assert_eq!(size.used_mb, 100_000);
    assert!(gateway.exists("SPRC1").await);
    assert!(!gateway.exists("SPRC2").await);
}

#[test]
fn test_wire_request_shape() {
    let log = new_log();
    let shell = FakeShell::new(log);
    let agent = DbaasAgent::new(&shell, "node1", paths(), Duration::ZERO);

    let resize = AsmRequest::for_diskgroup(AsmAction::Resize, "DATAC1").param("new_size", 20_480);
    let wire = agent.wire_request(&resize);
    assert_eq!(wire["object"], "db");
    assert_eq!(wire["operation"], "diskgroup");
    assert_eq!(wire["action"], "resize");
    assert_eq!(wire["params"]["dbname"], "grid");
    assert_eq!(wire["params"]["diskgroup"], "DATAC1");
    assert_eq!(wire["params"]["new_size"], 20_480);
    assert!(wire["params"].get("infofile").is_none());
    let outputfile = wire["outputfile"].as_str().unwrap();
    assert!(outputfile.starts_with("/var/dbaas/grid/diskgroupOp"));
    assert!(outputfile.ends_with(".out"));
    assert!(outputfile.contains(".resize_"));

    let info = AsmRequest::for_diskgroup(AsmAction::Info, "DATAC1").param("props", vec!["failgroups"]);
    let wire = agent.wire_request(&info);
    let infofile = wire["params"]["infofile"].as_str().unwrap();
    assert!(infofile.starts_with("/var/dbaas/grid/diskgroupOp"));
    assert!(infofile.ends_with(".json"));
}

#[tokio::test]
async fn test_dbaas_agent_submit_and_wait() {
    let log = new_log();
    let shell = FakeShell::new(log.clone())
        .respond(".create_", r#"{"id": "job-7"}"#)
        .respond(".status_", r#"{"status": "Success", "msg": "diskgroup created", "errmsg": null}"#);
    let agent = DbaasAgent::new(&shell, "node1", paths(), Duration::ZERO);
    let request = AsmRequest::for_diskgroup(AsmAction::Create, "SPRC1");

    let job = agent.submit(&request).await.unwrap();
    assert_eq!(job, "job-7");
    let response = agent.wait(&job, &request).await.unwrap();
    assert!(response.succeeded());
    assert_eq!(response.msg, "diskgroup created");
    assert!(response.errmsg.is_empty());

    let log = calls(&log);
    assert!(log.iter().any(|c| c.starts_with("copy node1: /var/dbaas/req/diskgroupOp-")));
    assert!(log.iter().any(|c| c.contains("nohup /opt/dbaasapi -i /var/dbaas/req/")));
}

#[tokio::test]
async fn test_dbaas_agent_without_job_id() {
    let log = new_log();
    let shell = FakeShell::new(log).respond(".drop_", r#"{"status": "Failed"}"#);
    let agent = DbaasAgent::new(&shell, "node1", paths(), Duration::ZERO);

    let err = agent.submit(&AsmRequest::for_diskgroup(AsmAction::Drop, "SPRC1")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::DbaasObjJobIdReadFail);
}

#[tokio::test]
async fn test_dbaas_agent_unreadable_output() {
    let log = new_log();
    let shell = FakeShell::new(log);
    let agent = DbaasAgent::new(&shell, "node1", paths(), Duration::ZERO);

    let err = agent.submit(&AsmRequest::for_diskgroup(AsmAction::Drop, "SPRC1")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ErrorReadingPayload);
}

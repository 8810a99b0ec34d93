use super::fakes::{cell_hosts, new_log, test_config, FakeAgent, FakeShell};
use crate::diskgroup::gateway::AsmGateway;
use crate::diskgroup::griddisk::GridDiskExecutor;
use crate::diskgroup::validator::{
    free_pct_after, rebalance_space_needed, shrink_leaves_enough_free, GrowthDemand, RebalanceHeadroom, Validator,
};
use crate::diskgroup::ErrorKind;

#[test]
fn test_free_space_policy_by_cell_count() {
    assert!(!shrink_leaves_enough_free(3, 14.0));
    assert!(!shrink_leaves_enough_free(3, 15.0));
    assert!(shrink_leaves_enough_free(3, 15.5));
    assert!(shrink_leaves_enough_free(6, 10.0));
    assert!(!shrink_leaves_enough_free(6, 9.0));
}

#[test]
fn test_free_pct_after() {
    assert!((free_pct_after(100_000, 80_000) - 20.0).abs() < 1e-9);
    assert!(free_pct_after(10_000, 20_000) < 0.0);
    assert!(free_pct_after(0, 0).abs() < f64::EPSILON);
}

#[test]
fn test_growth_demand_slices() {
    let demand = GrowthDemand { current_mb: 81_920, new_mb: 102_400, os_mb: 20_480 };
    assert_eq!(demand.slices(2, 2), (20_480, 25_600));

    // Without an OS figure the current slice is derived from the total.
    let demand = GrowthDemand { current_mb: 81_920, new_mb: 102_400, os_mb: 0 };
    assert_eq!(demand.slices(2, 2), (20_480, 25_600));
}

#[test]
fn test_rebalance_space_needed() {
    let (need, more) = rebalance_space_needed(2, 0, 0.0);
    assert!((need - 6_144.0).abs() < f64::EPSILON);
    assert!(more.abs() < f64::EPSILON);

    let (_, more) = rebalance_space_needed(2, 1, 100.0);
    assert!(more > 8_000.0 && more < 8_500.0, "got {more}");
}

#[tokio::test]
async fn test_shrink_refused_when_free_space_too_low() {
    let log = new_log();
    let shell = FakeShell::cells(log.clone());
    let agent = FakeAgent::new(log).with_diskgroup("DATAC1", 102_400, 75_000, 25_600);
    let cfg = test_config();
    let cells = cell_hosts();
    let gateway = AsmGateway::new(&agent, &cfg);
    let griddisks = GridDiskExecutor::new(&shell, &cells, cfg.sparse_vsize_factor);
    let validator = Validator::new(&gateway, &griddisks, &cfg);

    // 81920 MB with 75000 used leaves under 9%.
    let err = validator.check_resizable("DATAC1", 81_920, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonModifiable);

    let snapshot = validator.check_resizable("DATAC1", 92_160, None).await.unwrap();
    assert_eq!(snapshot.total_mb, 102_400);
}

#[tokio::test]
async fn test_growth_refused_when_cell_disks_lack_space() {
    let log = new_log();
    let shell = FakeShell::new(log.clone())
        .respond("attributes size where asmDiskGroupName", "20G")
        .respond("attributes name,size,freespace", "CD_00_cell01 10T 1G")
        .respond("attributes name;", "CD_00_cell01\nCD_01_cell01");
    let agent = FakeAgent::new(log).with_diskgroup("DATAC1", 81_920, 20_000, 20_480);
    let cfg = test_config();
    let cells = cell_hosts();
    let gateway = AsmGateway::new(&agent, &cfg);
    let griddisks = GridDiskExecutor::new(&shell, &cells, cfg.sparse_vsize_factor);
    let validator = Validator::new(&gateway, &griddisks, &cfg);

    let err = validator.check_resizable_all(&[("DATAC1".to_string(), 102_400)]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonModifiable);
    assert!(err.detail.contains("requested slice 25600 MB"));
}

#[tokio::test]
async fn test_growth_already_sized_skips_free_space_check() {
    let log = new_log();
    let shell = FakeShell::new(log.clone())
        .respond("attributes size where asmDiskGroupName", "25G")
        .respond("attributes name,size,freespace", "CD_00_cell01 10T 1G")
        .respond("attributes name;", "CD_00_cell01\nCD_01_cell01");
    let agent = FakeAgent::new(log).with_diskgroup("DATAC1", 81_920, 20_000, 20_480);
    let cfg = test_config();
    let cells = cell_hosts();
    let gateway = AsmGateway::new(&agent, &cfg);
    let griddisks = GridDiskExecutor::new(&shell, &cells, cfg.sparse_vsize_factor);
    let validator = Validator::new(&gateway, &griddisks, &cfg);

    validator.check_resizable_all(&[("DATAC1".to_string(), 102_400)]).await.unwrap();
}

#[tokio::test]
async fn test_size_change_under_two_percent_not_permitted() {
    let log = new_log();
    let shell = FakeShell::cells(log.clone());
    let agent = FakeAgent::new(log)
        .with_diskgroup("DATAC1", 102_400, 20_000, 25_600)
        .with_diskgroup("RECOC1", 102_400, 20_000, 25_600);
    let cfg = test_config();
    let cells = cell_hosts();
    let gateway = AsmGateway::new(&agent, &cfg);
    let griddisks = GridDiskExecutor::new(&shell, &cells, cfg.sparse_vsize_factor);
    let validator = Validator::new(&gateway, &griddisks, &cfg);

    // The summed change is what counts: +3% and -2% net out to 0.5%.
    let targets = [("DATAC1".to_string(), 105_472), ("RECOC1".to_string(), 100_352)];
    let err = validator.check_size_change_permitted(&targets).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::DgSizeChangeNotPermitted);

    let targets = [("DATAC1".to_string(), 81_920), ("RECOC1".to_string(), 102_400)];
    validator.check_size_change_permitted(&targets).await.unwrap();
}

#[tokio::test]
async fn test_rebalance_precheck_headroom() {
    let log = new_log();
    let shell = FakeShell::cells(log.clone());
    let agent = FakeAgent::new(log)
        .with_diskgroup("DATAC1", 102_400, 20_000, 25_600)
        .with_diskgroup("RECOC1", 102_400, 92_000, 25_600)
        .with_diskgroup("SPRC1", 1_024_000, 1_020_000, 0);
    let cfg = test_config();
    let cells = cell_hosts();
    let gateway = AsmGateway::new(&agent, &cfg);
    let griddisks = GridDiskExecutor::new(&shell, &cells, cfg.sparse_vsize_factor);
    let validator = Validator::new(&gateway, &griddisks, &cfg);

    let ample = validator.rebalance_precheck(&["DATAC1".to_string()], 1, 100.0).await.unwrap();
    assert_eq!(ample, RebalanceHeadroom::Sufficient);

    let tight = validator
        .rebalance_precheck(&["DATAC1".to_string(), "RECOC1".to_string()], 1, 100.0)
        .await
        .unwrap();
    assert_eq!(tight, RebalanceHeadroom::LowerPower);

    // SPRC1 is 102400 MB physical with 102000 used.
    let err = validator.rebalance_precheck(&["SPRC1".to_string()], 1, 100.0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonModifiable);
}

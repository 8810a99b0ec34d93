use crate::diskgroup::planner::{default_ratio, infer_current_ratio, infer_total_gb, plan_sizes, PlanInput};
use crate::diskgroup::types::{align_down, slice_size_mb, RatioSpec};
use super::fakes::test_config;
use crate::diskgroup::{ErrorKind, OperationConfig, Redundancy};

fn input(data_mb: u64, reco_mb: u64) -> PlanInput {
    PlanInput {
        data_mb,
        reco_mb,
        sparse_mb: None,
        redundancy: Redundancy::Normal,
        ratio: None,
        total_storage_gb: None,
        disk_backup_enabled: None,
        sparse_create: true,
        shrink_existing: true,
    }
}

#[test]
fn test_create_defaults_to_backup_sparse_ratio() {
    let plan = plan_sizes(&input(4_096_000, 6_144_000)).unwrap();
    assert!(plan.backup_enabled);
    assert_eq!(plan.ratio.to_string(), "35:50:15");
    assert_eq!(plan.data.pct, 35);
    assert_eq!(plan.reco.pct, 50);
    assert_eq!(plan.sparse.unwrap().pct, 15);
    // 11800 GB under normal redundancy.
    assert_eq!(plan.total_mb, 11_800 * 2 * 1024);
    assert_eq!(plan.data.size_mb + plan.reco.size_mb + plan.sparse.unwrap().size_mb, plan.total_mb);
}

#[test]
fn test_data_heavy_cluster_uses_no_backup_ratio() {
    let plan = plan_sizes(&input(6_144_000, 2_048_000)).unwrap();
    assert!(!plan.backup_enabled);
    assert_eq!(plan.ratio.to_string(), "60:20:20");
}

#[test]
fn test_explicit_ratio_and_total() {
    let plan = plan_sizes(&PlanInput {
        ratio: Some("40:40:20".to_string()),
        total_storage_gb: Some(1000),
        redundancy: Redundancy::External,
        ..input(300_000, 300_000)
    })
    .unwrap();
    assert_eq!(plan.total_mb, 1_024_000);
    assert_eq!(plan.data.size_mb, 409_600);
    assert_eq!(plan.reco.size_mb, 409_600);
    assert_eq!(plan.sparse.unwrap().size_mb, 204_800);
}

#[test]
fn test_ratio_must_match_sparse_create() {
    let err = plan_sizes(&PlanInput { ratio: Some("40:60".to_string()), ..input(4_096_000, 6_144_000) })
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgs);

    let err = plan_sizes(&PlanInput {
        ratio: Some("35:50:15".to_string()),
        sparse_create: false,
        ..input(4_096_000, 6_144_000)
    })
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgs);
}

#[test]
fn test_data_share_below_ten_percent_is_rejected() {
    let err = plan_sizes(&PlanInput { ratio: Some("5:80:15".to_string()), ..input(4_096_000, 6_144_000) })
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgs);
}

#[test]
fn test_without_shrink_existing_tiers_keep_their_size() {
    let plan = plan_sizes(&PlanInput {
        shrink_existing: false,
        redundancy: Redundancy::External,
        ..input(4_096_000, 6_144_000)
    })
    .unwrap();
    assert_eq!(plan.data.size_mb, 4_096_000);
    assert_eq!(plan.reco.size_mb, 6_144_000);
    // A two-tier cluster has no sparse share to infer, so nothing is left over.
    assert_eq!(plan.current_ratio.to_string(), "40:60");
    assert_eq!(plan.sparse.unwrap().size_mb, 0);
}

#[test]
fn test_without_shrink_nonstandard_sizes_need_a_total() {
    let err = plan_sizes(&PlanInput { shrink_existing: false, ..input(2_000_000, 1_000_000) }).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgs);
    assert!(err.detail.contains("not standard"));
}

#[test]
fn test_drop_plan_returns_sparse_space() {
    let plan = plan_sizes(&PlanInput {
        sparse_mb: Some(1_812_480),
        sparse_create: false,
        redundancy: Redundancy::External,
        ..input(4_229_120, 6_041_600)
    })
    .unwrap();
    assert!(plan.sparse.is_none());
    assert_eq!(plan.aligned_data_mb(), 4_833_280);
    assert_eq!(plan.aligned_reco_mb(), 7_249_920);
}

#[test]
fn test_infer_current_ratio_bands() {
    assert_eq!(infer_current_ratio(4_096_000, 6_144_000).unwrap().to_string(), "40:60");
    assert_eq!(infer_current_ratio(7_000, 10_000).unwrap().to_string(), "35:50:15");
    assert_eq!(infer_current_ratio(3_000, 1_000).unwrap().to_string(), "60:20:20");
    assert_eq!(infer_current_ratio(4_000, 1_000).unwrap().to_string(), "80:20");

    let err = infer_current_ratio(2_000, 1_000).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgs);
    assert!(infer_current_ratio(1_000, 0).is_err());
    // Between the two backup bands.
    assert!(infer_current_ratio(6_850, 10_000).is_err());
}

#[test]
fn test_infer_total_gb() {
    let two = RatioSpec::parse("40:60").unwrap();
    let three = RatioSpec::parse("35:50:15").unwrap();
    assert_eq!(infer_total_gb(4_096_000, 6_144_000, None, &two), 10_000);
    assert_eq!(infer_total_gb(4_096_000, 6_144_000, None, &three), 11_800);
    assert_eq!(infer_total_gb(4_096_000, 6_144_000, Some(1_024_000), &two), 11_000);
}

#[test]
fn test_default_ratio_table() {
    assert_eq!(default_ratio(true, true).to_string(), "35:50:15");
    assert_eq!(default_ratio(false, true).to_string(), "60:20:20");
    assert_eq!(default_ratio(true, false).to_string(), "40:60");
    assert_eq!(default_ratio(false, false).to_string(), "80:20");
}

#[test]
fn test_ratio_parse_rejects_bad_input() {
    for bad in ["", "40", "40:0:60", "a:b", "10:20:30:40", "40:-60"] {
        let err = RatioSpec::parse(bad).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgs, "{bad} should be rejected");
    }
    let ok = RatioSpec::parse(" 35 : 50 : 15 ").unwrap();
    assert_eq!(ok.sum(), 100);
    assert_eq!(ok.sparse(), Some(15));
}

#[test]
fn test_alignment() {
    assert_eq!(align_down(1_057_295), 1_057_280);
    assert_eq!(align_down(15), 0);
    assert_eq!(slice_size_mb(4_229_120, 2, 2), 1_057_280);
    assert_eq!(slice_size_mb(1_000, 0, 12), 0);
}

#[test]
fn test_sparse_conversion_round_trip() {
    for factor in [1, 2, 8, 10, 16] {
        let cfg = OperationConfig { sparse_vsize_factor: factor, ..test_config() };
        for multiple in [0, 1, 16, 1_057_280, 4_531_200] {
            let virtual_mb = multiple * factor;
            assert_eq!(cfg.to_physical(virtual_mb), multiple, "factor {factor}");
            assert_eq!(cfg.to_virtual(cfg.to_physical(virtual_mb)), virtual_mb, "factor {factor}");
        }
    }
}

#[test]
fn test_physical_for_converts_only_sparse_names() {
    let cfg = OperationConfig { sparse_vsize_factor: 10, ..test_config() };
    assert_eq!(cfg.physical_for("SPRC1", 18_124_800), 1_812_480);
    assert_eq!(cfg.physical_for("DATAC1", 18_124_800), 18_124_800);
    assert_eq!(cfg.physical_for("RECOC1", 6_041_600), 6_041_600);
}

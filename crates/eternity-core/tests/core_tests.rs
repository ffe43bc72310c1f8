use eternity_core::{
    next_free_id, plan_request, select_saves, Host, Instance, InstanceStatus, MigrationRequest,
    PlanAction, SaveSelection, SaveSnapshot, SaveUploadResult, BENCHMARK_INSTANCE_IDS,
};

#[test]
fn test_instance_decodes_without_host() {
    let json = r#"{"id": 7, "name": "spawn", "assigned_host": null, "status": "stopped"}"#;
    let instance: Instance = serde_json::from_str(json).unwrap();
    assert_eq!(instance.assigned_host, None);
    assert_eq!(instance.status, InstanceStatus::Stopped);
}

#[test]
fn test_host_metrics_optional() {
    let json = r#"{"id": 1, "name": "alpha", "connected": true, "version": "2.0.0"}"#;
    let host: Host = serde_json::from_str(json).unwrap();
    assert!(host.metrics.is_none());

    let json = r#"{"id": 1, "name": "alpha", "connected": true, "version": "2.0.0",
                   "metrics": {"cpu_available": 6.5}}"#;
    let host: Host = serde_json::from_str(json).unwrap();
    assert_eq!(host.metrics.unwrap().cpu_available, 6.5);
}

#[test]
fn test_save_default_flag_defaults_false() {
    let json = r#"{"instance_id": 1, "name": "a.zip", "mtime_ms": 5, "size": 10}"#;
    let save: SaveSnapshot = serde_json::from_str(json).unwrap();
    assert!(!save.loaded_by_default);
}

#[test]
fn test_upload_result_decodes_partial_payload() {
    let res: SaveUploadResult = serde_json::from_str(r#"{"saves": ["x.zip"]}"#).unwrap();
    assert_eq!(res.created_save("x.zip").unwrap(), "x.zip");
}

#[test]
fn test_benchmark_ids_skip_existing() {
    let start = BENCHMARK_INSTANCE_IDS.start;
    let used = vec![1, start, start + 1];
    assert_eq!(next_free_id(used, BENCHMARK_INSTANCE_IDS).unwrap(), start + 2);
}

#[test]
fn test_selection_sorts_unordered_input() {
    let saves = vec![
        SaveSnapshot {
            instance_id: 1,
            name: "b.zip".into(),
            mtime_ms: 2_000,
            size: 1,
            loaded_by_default: false,
        },
        SaveSnapshot {
            instance_id: 1,
            name: "a.zip".into(),
            mtime_ms: 1_000,
            size: 1,
            loaded_by_default: true,
        },
    ];
    let selection = SaveSelection {
        interval_ms: 500,
        ..Default::default()
    };
    let out = select_saves(&saves, &selection);
    assert_eq!(out[0].name, "a.zip");
    assert_eq!(out[1].name, "b.zip");
}

#[test]
fn test_from_host_selector_migrates_everything_on_host() {
    let hosts = vec![
        Host {
            id: 1,
            name: "old".into(),
            connected: true,
            version: "1".into(),
            metrics: None,
        },
        Host {
            id: 2,
            name: "new".into(),
            connected: true,
            version: "1".into(),
            metrics: None,
        },
    ];
    let instances = vec![
        Instance {
            id: 1,
            name: "a".into(),
            assigned_host: Some(1),
            status: InstanceStatus::Running,
        },
        Instance {
            id: 2,
            name: "b".into(),
            assigned_host: Some(2),
            status: InstanceStatus::Running,
        },
        Instance {
            id: 3,
            name: "c".into(),
            assigned_host: Some(1),
            status: InstanceStatus::Stopping,
        },
    ];
    let req = MigrationRequest {
        instances: vec![],
        from_hosts: vec!["old".into()],
        to_hosts: vec!["new".into()],
    };
    let plans = plan_request(&req, &instances, &hosts).unwrap();
    let summary: Vec<_> = plans.iter().map(|p| (p.instance_id, p.action)).collect();
    assert_eq!(
        summary,
        vec![
            (1, PlanAction::Migrate),
            (3, PlanAction::SkipBadStatus(InstanceStatus::Stopping)),
        ]
    );
}

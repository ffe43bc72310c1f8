use eternity_control::{
    Call, CallKind, InMemoryController, MigrationError, MigrationOutcome, MigrationStep,
    MigrationSummary, Migrator,
};
use eternity_core::{
    plan_migration, plan_request, Host, HostId, Instance, InstanceId, InstanceStatus,
    MigrationRequest, PlanAction, SaveSnapshot, SaveUploadResult, UploadIssue,
};

fn host(id: HostId, name: &str) -> Host {
    Host {
        id,
        name: name.to_string(),
        connected: true,
        version: "2.0.0".to_string(),
        metrics: None,
    }
}

fn instance(id: InstanceId, name: &str, host: Option<HostId>, status: InstanceStatus) -> Instance {
    Instance {
        id,
        name: name.to_string(),
        assigned_host: host,
        status,
    }
}

fn save(instance_id: InstanceId, name: &str, default: bool) -> SaveSnapshot {
    SaveSnapshot {
        instance_id,
        name: name.to_string(),
        mtime_ms: 1_700_000_000_000,
        size: 5,
        loaded_by_default: default,
    }
}

fn hosts() -> Vec<Host> {
    vec![host(1, "host1"), host(2, "host2"), host(3, "host3")]
}

fn controller(instances: Vec<Instance>) -> InMemoryController {
    InMemoryController::new()
        .with_hosts(hosts())
        .with_instances(instances)
}

#[tokio::test]
async fn test_running_instance_call_order() {
    let a = instance(1, "alpha", Some(1), InstanceStatus::Running);
    let ctl = controller(vec![a.clone()]);
    ctl.add_save(save(1, "world.zip", true), b"bytes".to_vec());
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&a], &[2]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let outcome = migrator.migrate(&plans[0]).await.unwrap();

    assert_eq!(
        ctl.call_kinds(),
        vec![
            CallKind::Stop,
            CallKind::ListSaves,
            CallKind::RequestDownload,
            CallKind::FetchStream,
            CallKind::Assign,
            CallKind::Upload,
            CallKind::Start,
        ]
    );
    assert_eq!(ctl.calls().last(), Some(&Call::Start(1, Some("world.zip".to_string()))));

    match outcome {
        MigrationOutcome::Migrated { save, local, restarted } => {
            assert_eq!(save, "world.zip");
            assert!(restarted);
            assert_eq!(std::fs::read(local).unwrap(), b"bytes");
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let moved = ctl.instance(1).unwrap();
    assert_eq!(moved.assigned_host, Some(2));
    assert_eq!(moved.status, InstanceStatus::Running);
}

#[tokio::test]
async fn test_stopped_instance_is_not_stopped_or_started() {
    let b = instance(2, "beta", Some(1), InstanceStatus::Stopped);
    let ctl = controller(vec![b.clone()]);
    ctl.add_save(save(2, "beta.zip", true), b"b".to_vec());
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&b], &[3]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let outcome = migrator.migrate(&plans[0]).await.unwrap();

    assert_eq!(
        ctl.call_kinds(),
        vec![
            CallKind::ListSaves,
            CallKind::RequestDownload,
            CallKind::FetchStream,
            CallKind::Assign,
            CallKind::Upload,
        ]
    );
    assert!(matches!(outcome, MigrationOutcome::Migrated { restarted: false, .. }));
    assert_eq!(ctl.instance(2).unwrap().status, InstanceStatus::Stopped);
}

#[tokio::test]
async fn test_skipped_plan_entry_is_not_executed() {
    let a = instance(1, "alpha", Some(2), InstanceStatus::Running);
    let b = instance(2, "beta", Some(1), InstanceStatus::Starting);
    let ctl = controller(vec![a.clone(), b.clone()]);
    ctl.add_save(save(1, "alpha.zip", true), b"a".to_vec());
    ctl.add_save(save(2, "beta.zip", true), b"b".to_vec());
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&a, &b], &[2]).unwrap();
    assert_eq!(plans[0].action, PlanAction::SkipSameHost);
    assert_eq!(plans[1].action, PlanAction::SkipBadStatus(InstanceStatus::Starting));

    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    for plan in &plans {
        let outcome = migrator.migrate(plan).await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::Skipped(action) if action == plan.action));
    }
    assert!(ctl.calls().is_empty());
    assert_eq!(ctl.instance(2).unwrap().assigned_host, Some(1));
}

#[tokio::test]
async fn test_missing_default_save_stops_before_assign() {
    let a = instance(1, "alpha", Some(1), InstanceStatus::Running);
    let ctl = controller(vec![a.clone()]);
    ctl.add_save(save(1, "old.zip", false), b"x".to_vec());
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&a], &[2]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let err = migrator.migrate(&plans[0]).await.unwrap_err();

    assert!(matches!(
        err,
        MigrationError::MissingDefaultSave { ref instance } if instance == "alpha"
    ));
    let kinds = ctl.call_kinds();
    assert!(!kinds.contains(&CallKind::Assign));
    assert!(!kinds.contains(&CallKind::Upload));
    assert_eq!(ctl.instance(1).unwrap().assigned_host, Some(1));
}

#[tokio::test]
async fn test_upload_errors_fail_the_migration() {
    let a = instance(1, "alpha", Some(1), InstanceStatus::Running);
    let ctl = controller(vec![a.clone()]);
    ctl.add_save(save(1, "world.zip", true), b"bytes".to_vec());
    ctl.set_upload_result(SaveUploadResult {
        saves: vec!["world.zip".to_string()],
        errors: vec![UploadIssue {
            message: "corrupt zip".to_string(),
        }],
    });
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&a], &[2]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let err = migrator.migrate(&plans[0]).await.unwrap_err();

    assert!(matches!(err, MigrationError::UploadRejected(_)));
    assert_eq!(err.failed_step(), Some(MigrationStep::Upload));
    assert!(!ctl.call_kinds().contains(&CallKind::Start));
    // The download stays around for manual recovery.
    assert!(staging.path().join("world.zip").exists());
}

#[tokio::test]
async fn test_empty_upload_result_fails_the_migration() {
    let a = instance(1, "alpha", Some(1), InstanceStatus::Stopped);
    let ctl = controller(vec![a.clone()]);
    ctl.add_save(save(1, "world.zip", true), b"bytes".to_vec());
    ctl.set_upload_result(SaveUploadResult::default());
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&a], &[2]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let err = migrator.migrate(&plans[0]).await.unwrap_err();
    assert!(matches!(err, MigrationError::UploadRejected(_)));
}

#[tokio::test]
async fn test_batch_continues_after_step_failure() {
    let a = instance(1, "alpha", Some(1), InstanceStatus::Running);
    let b = instance(2, "beta", Some(1), InstanceStatus::Stopped);
    let ctl = controller(vec![a.clone(), b.clone()]);
    ctl.add_save(save(1, "alpha.zip", true), b"a".to_vec());
    ctl.add_save(save(2, "beta.zip", true), b"b".to_vec());
    ctl.fail_for(CallKind::Assign, 1, "host full");
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&a, &b], &[2]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let reports = migrator.run(&plans).await.unwrap();

    assert_eq!(reports.len(), 2);
    match &reports[0].outcome {
        MigrationOutcome::Failed(e) => assert_eq!(e.failed_step(), Some(MigrationStep::Assign)),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(reports[1].is_migrated());
    assert_eq!(ctl.instance(2).unwrap().assigned_host, Some(2));
    // The failed instance is neither uploaded nor restarted.
    assert!(!ctl.calls().contains(&Call::Start(1, Some("alpha.zip".to_string()))));
}

#[tokio::test]
async fn test_local_io_failure_aborts_batch() {
    let a = instance(1, "alpha", Some(1), InstanceStatus::Stopped);
    let b = instance(2, "beta", Some(1), InstanceStatus::Stopped);
    let ctl = controller(vec![a.clone(), b.clone()]);
    ctl.add_save(save(1, "alpha.zip", true), b"a".to_vec());
    ctl.add_save(save(2, "beta.zip", true), b"b".to_vec());

    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("file");
    std::fs::write(&not_a_dir, b"").unwrap();

    let plans = plan_migration(&[&a, &b], &[2]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), &not_a_dir);
    let err = migrator.run(&plans).await.unwrap_err();

    assert!(!err.is_recoverable());
    assert_eq!(ctl.calls(), vec![Call::ListSaves(Some(1))]);
}

#[tokio::test]
async fn test_same_save_name_does_not_collide() {
    let a = instance(1, "alpha", Some(1), InstanceStatus::Stopped);
    let b = instance(2, "beta", Some(1), InstanceStatus::Stopped);
    let ctl = controller(vec![a.clone(), b.clone()]);
    ctl.add_save(save(1, "world.zip", true), b"first".to_vec());
    ctl.add_save(save(2, "world.zip", true), b"second".to_vec());
    let staging = tempfile::tempdir().unwrap();

    let plans = plan_migration(&[&a, &b], &[2]).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let reports = migrator.run(&plans).await.unwrap();
    assert!(reports.iter().all(|r| r.is_migrated()));

    assert_eq!(std::fs::read(staging.path().join("world.zip")).unwrap(), b"first");
    assert_eq!(std::fs::read(staging.path().join("world-1.zip")).unwrap(), b"second");
    assert_eq!(ctl.save_bytes(2, "world.zip").unwrap(), b"second");
}

#[tokio::test]
async fn test_end_to_end_round_robin_batch() {
    let instances = vec![
        instance(1, "A", Some(1), InstanceStatus::Running),
        instance(2, "B", Some(1), InstanceStatus::Stopped),
        instance(3, "C", None, InstanceStatus::Unassigned),
    ];
    let ctl = controller(instances.clone());
    ctl.add_save(save(1, "a.zip", true), b"a".to_vec());
    ctl.add_save(save(2, "b.zip", true), b"b".to_vec());
    let staging = tempfile::tempdir().unwrap();

    let request = MigrationRequest {
        instances: vec!["A".into(), "B".into(), "C".into()],
        from_hosts: vec![],
        to_hosts: vec!["host2".into(), "host3".into()],
    };
    let plans = plan_request(&request, &instances, &hosts()).unwrap();
    let migrator = Migrator::new(&ctl, &hosts(), staging.path());
    let reports = migrator.run(&plans).await.unwrap();

    assert_eq!(reports[0].destination_host, "host2");
    assert_eq!(reports[0].source_host.as_deref(), Some("host1"));
    assert!(reports[0].is_migrated());
    assert_eq!(reports[1].destination_host, "host3");
    assert!(reports[1].is_migrated());
    assert!(matches!(
        reports[2].outcome,
        MigrationOutcome::Skipped(PlanAction::SkipUnassigned)
    ));

    assert_eq!(ctl.instance(1).unwrap().assigned_host, Some(2));
    assert_eq!(ctl.instance(2).unwrap().assigned_host, Some(3));
    assert_eq!(ctl.instance(3).unwrap().assigned_host, None);
    assert_eq!(
        MigrationSummary::of(&reports),
        MigrationSummary {
            migrated: 2,
            skipped: 1,
            failed: 0
        }
    );
}

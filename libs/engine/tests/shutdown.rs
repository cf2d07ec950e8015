//! S6: shutdown cleanup and restart recovery

mod common;

use std::time::{Duration, Instant};

use metalforge_db::HistoryStore;
use metalforge_domain::{ErrorKind, WorkflowStatus};
use metalforge_engine::{CreateWorkflowRequest, ManagerConfig};

use common::{harness_with, Harness};

#[tokio::test]
async fn s6_shutdown_with_blocked_workflow() {
    let Harness {
        manager,
        history,
        stubs,
    } = harness_with(ManagerConfig {
        shutdown_grace: Duration::from_secs(2),
        ..ManagerConfig::default()
    });

    // Workflow A blocks inside its pull step for 60 s.
    stubs
        .injector()
        .delay("vendor.pull_bios", Duration::from_secs(60));

    let blocked = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-a")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.5", None),
        )
        .await
        .unwrap();

    // Let the workflow reach the blocked pull step.
    let mut reached = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snapshot = manager.get_workflow(&blocked).await.unwrap();
        if snapshot.current_step.as_deref() == Some("pull_bios_config") {
            reached = true;
            break;
        }
    }
    assert!(reached, "workflow never reached the blocked step");

    let started = Instant::now();
    manager.shutdown().await;
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_secs(4),
        "shutdown took {elapsed:?}, expected grace (2s) + epsilon",
    );

    // The blocked workflow was force-finalized.
    let snapshot = manager.get_workflow(&blocked).await.unwrap();
    assert!(snapshot.status.is_terminal());
    let error_kind = snapshot.error.as_ref().unwrap().kind;
    assert!(
        matches!(error_kind, ErrorKind::Cancelled | ErrorKind::ShutdownTimeout),
        "unexpected error kind {error_kind}",
    );

    // History is finalized; a fresh startup scan finds nothing to recover.
    let record = history.get(&blocked).await.unwrap();
    assert!(record.status.is_terminal());
    assert_eq!(history.recover_interrupted().await.unwrap(), 0);
}

#[tokio::test]
async fn s6_shutdown_with_healthy_and_blocked_workflows() {
    let Harness {
        manager,
        history,
        stubs,
    } = harness_with(ManagerConfig {
        shutdown_grace: Duration::from_secs(2),
        ..ManagerConfig::default()
    });

    // B runs to completion first, against healthy stubs.
    let healthy = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-b")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.6", None),
        )
        .await
        .unwrap();
    manager.wait(&healthy).await;

    // Now block the adapter and start A.
    stubs
        .injector()
        .delay("vendor.pull_bios", Duration::from_secs(60));
    let blocked = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-a")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.5", None),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    manager.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(4));

    // Both terminal, both finalized in history.
    for id in [&healthy, &blocked] {
        let snapshot = manager.get_workflow(id).await.unwrap();
        assert!(snapshot.status.is_terminal(), "{id} not terminal");
        let record = history.get(id).await.unwrap();
        assert!(record.status.is_terminal(), "{id} history not finalized");
    }

    let healthy_record = history.get(&healthy).await.unwrap();
    assert_eq!(healthy_record.status, WorkflowStatus::Completed);

    let blocked_record = history.get(&blocked).await.unwrap();
    assert_eq!(blocked_record.status, WorkflowStatus::Failed);
    assert_eq!(
        blocked_record.error.unwrap().kind,
        ErrorKind::ShutdownTimeout,
    );

    // Fresh start: no RUNNING rows remain.
    assert_eq!(history.recover_interrupted().await.unwrap(), 0);
}

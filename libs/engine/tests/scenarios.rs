//! End-to-end workflow scenarios against stub adapters

mod common;

use std::time::{Duration, Instant};

use metalforge_adapters::AdapterError;
use metalforge_adapters::ExecOutput;
use metalforge_db::HistoryStore;
use metalforge_domain::{ErrorKind, ProgressEvent, ProgressKind, StepStatus, WorkflowStatus};
use metalforge_engine::{CreateWorkflowRequest, ProgressSubscriber};

use common::{harness, Harness};

/// Drain events for one workflow until its `workflow_end` arrives
async fn drain_until_end(
    sub: &mut ProgressSubscriber,
    workflow_id: &str,
    timeout: Duration,
) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = tokio::time::timeout(remaining, sub.recv())
            .await
            .expect("timed out waiting for workflow_end")
            .expect("bus closed");

        if event.workflow_id != workflow_id {
            continue;
        }
        let is_end = event.kind == ProgressKind::WorkflowEnd;
        events.push(event);
        if is_end {
            return events;
        }
    }
}

// =============================================================================
// S1: basic happy path
// =============================================================================

#[tokio::test]
async fn s1_basic_happy_path() {
    let Harness {
        manager, history, ..
    } = harness();
    let mut sub = manager.subscribe_all();

    let id = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-001")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.5", Some("10.30.0.1".to_string())),
        )
        .await
        .unwrap();

    let events = drain_until_end(&mut sub, &id, Duration::from_secs(10)).await;
    manager.wait(&id).await;

    let snapshot = manager.get_workflow(&id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.steps_completed, 7);
    assert_eq!(snapshot.steps_total, 7);
    assert!(snapshot.error.is_none());

    // Exactly one terminal event.
    let ends = events
        .iter()
        .filter(|e| e.kind == ProgressKind::WorkflowEnd)
        .count();
    assert_eq!(ends, 1);

    // History finalized with sane timestamps.
    let record = history.get(&id).await.unwrap();
    assert_eq!(record.status, WorkflowStatus::Completed);
    assert_eq!(record.steps_completed, 7);
    assert!(record.completed_at.unwrap() >= record.started_at);
    assert_eq!(history.finalized_count(&id).await, 1);
}

// =============================================================================
// S2: retry then succeed
// =============================================================================

#[tokio::test]
async fn s2_retry_then_succeed() {
    let Harness {
        manager, stubs, ..
    } = harness();

    stubs.injector().inject(
        "vendor.pull_bios",
        AdapterError::ssh_transient("connection reset by peer"),
        1,
    );

    let started = Instant::now();
    let id = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-001")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.5", None),
        )
        .await
        .unwrap();
    manager.wait(&id).await;

    let snapshot = manager.get_workflow(&id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert!(snapshot.error.is_none());

    let pull = snapshot
        .steps
        .iter()
        .find(|s| s.name == "pull_bios_config")
        .unwrap();
    assert_eq!(pull.status, StepStatus::Completed);
    assert_eq!(pull.attempts, 2);

    // Backoff between attempts: first delay is 1 s ± 20%.
    assert!(
        started.elapsed() >= Duration::from_millis(700),
        "no backoff observed ({:?})",
        started.elapsed(),
    );
}

// =============================================================================
// S3: fatal midway
// =============================================================================

#[tokio::test]
async fn s3_fatal_midway() {
    let Harness {
        manager, history, stubs,
    } = harness();

    stubs.injector().inject(
        "vendor.push_bios",
        AdapterError::new(ErrorKind::ConfigConflict, "attribute rejected by firmware"),
        1,
    );

    let id = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-001")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.5", None),
        )
        .await
        .unwrap();
    manager.wait(&id).await;

    let snapshot = manager.get_workflow(&id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(snapshot.error.as_ref().unwrap().kind, ErrorKind::ConfigConflict);

    // push_bios_config is the fifth step (index 4): everything before it
    // completed, nothing after it started.
    let push_index = snapshot
        .steps
        .iter()
        .position(|s| s.name == "push_bios_config")
        .unwrap();
    assert_eq!(snapshot.steps_completed, push_index);
    assert_eq!(snapshot.steps[push_index].status, StepStatus::Failed);
    for step in &snapshot.steps[push_index + 1..] {
        assert_eq!(step.status, StepStatus::Skipped, "step {}", step.name);
    }

    let record = history.get(&id).await.unwrap();
    assert_eq!(record.status, WorkflowStatus::Failed);
    assert_eq!(record.error.unwrap().kind, ErrorKind::ConfigConflict);
}

// =============================================================================
// S4: cancellation during backoff
// =============================================================================

#[tokio::test]
async fn s4_cancellation_during_backoff() {
    let Harness {
        manager, stubs, ..
    } = harness();

    // Fail every pull attempt so the engine is in backoff when we cancel.
    stubs.injector().inject(
        "vendor.pull_bios",
        AdapterError::transient_network("bmc unreachable"),
        5,
    );

    let id = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-001")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.5", None),
        )
        .await
        .unwrap();

    // Let the workflow reach the pull step's first failure (the preceding
    // steps finish in microseconds against stubs, the backoff is ~1 s).
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(manager.cancel_workflow(&id).await);

    let cancelled_at = Instant::now();
    tokio::time::timeout(Duration::from_secs(1), manager.wait(&id))
        .await
        .expect("workflow did not reach a terminal state within 1s of cancel");
    assert!(cancelled_at.elapsed() < Duration::from_secs(1));

    let snapshot = manager.get_workflow(&id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Cancelled);

    let pull = snapshot
        .steps
        .iter()
        .find(|s| s.name == "pull_bios_config")
        .unwrap();
    assert_eq!(pull.status, StepStatus::Failed);
    assert_eq!(pull.error.as_ref().unwrap().kind, ErrorKind::Cancelled);

    let pull_index = snapshot
        .steps
        .iter()
        .position(|s| s.name == "pull_bios_config")
        .unwrap();
    for step in &snapshot.steps[pull_index + 1..] {
        assert_eq!(step.status, StepStatus::Skipped, "step {}", step.name);
    }
}

// =============================================================================
// S5: intelligent classification
// =============================================================================

#[tokio::test]
async fn s5_intelligent_classification() {
    let Harness {
        manager, stubs, ..
    } = harness();

    // Vendor and board match the catalog; CPU and core count do not, which
    // lands the score at 0.70: medium confidence.
    stubs.ssh.respond(
        "dmidecode",
        ExecOutput::ok(
            "Manufacturer: Supermicro\n\
             Product Name: X11DPT-B\n\
             CPU Model: Xeon 6258R\n\
             CPU Cores: 28\n",
        ),
    );

    let mut sub = manager.subscribe_all();
    let id = manager
        .create_workflow(
            CreateWorkflowRequest::new("intelligent_commissioning", "srv-005")
                .with_ipmi_target("10.30.0.9", None),
        )
        .await
        .unwrap();

    let events = drain_until_end(&mut sub, &id, Duration::from_secs(10)).await;
    manager.wait(&id).await;

    let snapshot = manager.get_workflow(&id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.device_type.as_deref(), Some("a1.c5.large"));

    let sub_tasks: Vec<&str> = events
        .iter()
        .filter(|e| e.kind == ProgressKind::SubTask)
        .filter_map(|e| e.payload.as_deref())
        .collect();

    // Classification reported a medium-confidence match.
    assert!(
        sub_tasks
            .iter()
            .any(|p| p.contains("a1.c5.large") && p.contains("Medium")),
        "no medium-confidence classification note in {sub_tasks:?}",
    );
    // The planner emitted a non-fallback plan.
    assert!(
        sub_tasks.iter().any(|p| p.contains("planned configuration")),
        "no intelligent plan note in {sub_tasks:?}",
    );
    assert!(
        !sub_tasks.iter().any(|p| p.contains("fallback plan")),
        "planner unexpectedly fell back in {sub_tasks:?}",
    );
}

// =============================================================================
// Vendor-tool skip semantics
// =============================================================================

#[tokio::test]
async fn discovery_skips_on_unsupported_vendor_without_facts() {
    let Harness {
        manager, stubs, ..
    } = harness();

    // The generic probe returns nothing and the vendor tool disclaims the
    // hardware: discovery must skip, not fail, and the workflow continues.
    stubs.ssh.respond("dmidecode", ExecOutput::ok(""));
    stubs.vendor_tool.set_not_applicable(true);

    let id = manager
        .create_workflow(
            CreateWorkflowRequest::new("intelligent_commissioning", "srv-009")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.9", None),
        )
        .await
        .unwrap();
    manager.wait(&id).await;

    let snapshot = manager.get_workflow(&id).await.unwrap();
    let discover = snapshot
        .steps
        .iter()
        .find(|s| s.name == "enhanced_discover_hardware")
        .unwrap();
    assert_eq!(discover.status, StepStatus::Skipped);
    assert!(discover.error.is_none());
}

//! Invariant checks under randomized fault patterns
//!
//! Seeded pseudo-random schedules keep these deterministic across runs.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use metalforge_adapters::stub::StubAdapters;
use metalforge_catalog::Catalog;
use metalforge_db::{HistoryStore, InMemoryHistoryStore};
use metalforge_domain::{
    ErrorKind, ProgressKind, StepError, StepOutcome, WorkflowStatus,
};
use metalforge_engine::{
    cancel_pair, Context, CreateWorkflowRequest, Engine, ProgressBus, RetryPolicy, StepSpec,
    WorkflowState,
};

use common::{harness, Harness, TEST_CATALOG};

/// Small deterministic generator (xorshift) for fault schedules
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

// =============================================================================
// Direct-engine fixture
// =============================================================================

/// Step that fails a scripted number of times before succeeding
struct FlakyStep {
    failures: AtomicU32,
    kind: ErrorKind,
}

#[async_trait]
impl metalforge_engine::Step for FlakyStep {
    async fn run(&self, _ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StepError::new(self.kind, "scripted failure"));
        }
        Ok(StepOutcome::Done)
    }
}

struct RunResult {
    status: WorkflowStatus,
    attempts: Vec<u32>,
    workflow_ends: usize,
    finalizes: usize,
}

/// Run one synthetic workflow straight through the engine
async fn run_engine(specs: Vec<StepSpec>) -> RunResult {
    let bus = Arc::new(ProgressBus::new());
    let history = Arc::new(InMemoryHistoryStore::new());
    let catalog = Arc::new(Catalog::load(TEST_CATALOG).unwrap());
    let (_signal, observer) = cancel_pair();

    let ctx = Context::new(
        "fuzz_wf_1",
        "srv-fuzz",
        "default",
        catalog,
        StubAdapters::new().registry(),
        observer,
        Arc::clone(&bus),
    );

    let shared = Arc::new(std::sync::RwLock::new(WorkflowState::new(
        "fuzz_wf_1",
        "fuzz",
        "srv-fuzz",
        None,
        &specs,
    )));

    let mut sub = bus.subscribe("fuzz_wf_1").await;
    let engine = Engine::new(Arc::clone(&bus), Arc::clone(&history) as Arc<dyn HistoryStore>);
    engine.execute(Arc::clone(&shared), specs, ctx).await;

    let mut workflow_ends = 0;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(50), sub.recv()).await
    {
        if event.kind == ProgressKind::WorkflowEnd {
            workflow_ends += 1;
        }
    }

    let state = shared.read().unwrap();
    RunResult {
        status: state.status,
        attempts: state.steps.iter().map(|s| s.attempts).collect(),
        workflow_ends,
        finalizes: history.finalized_count("fuzz_wf_1").await,
    }
}

// =============================================================================
// Invariants 1–4 under fault fuzz
// =============================================================================

#[tokio::test]
async fn fuzz_retry_patterns_hold_invariants() {
    let mut rng = Rng(0x5eed_cafe);

    for case in 0..24 {
        let retries = rng.below(4) as u32;
        let failures = rng.below(5) as u32;
        let fatal = rng.below(4) == 0;

        let kind = if fatal {
            ErrorKind::ConfigConflict
        } else {
            ErrorKind::TransientNetwork
        };

        let specs = vec![StepSpec::new(
            "flaky_step",
            "scripted flaky step",
            Arc::new(FlakyStep {
                failures: AtomicU32::new(failures),
                kind,
            }),
        )
        .with_retries(retries)
        .with_policy(RetryPolicy::fixed(Duration::from_millis(1)))];

        let result = run_engine(specs).await;

        // Invariant 1: exactly one terminal event and one finalize.
        assert_eq!(result.workflow_ends, 1, "case {case}");
        assert_eq!(result.finalizes, 1, "case {case}");

        // Invariant 4: attempts bounded by retries + 1.
        assert!(
            result.attempts[0] <= retries + 1,
            "case {case}: {} attempts with {retries} retries",
            result.attempts[0],
        );

        // Terminal status matches the schedule.
        let expected = if fatal && failures > 0 {
            WorkflowStatus::Failed
        } else if failures <= retries {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
        assert_eq!(result.status, expected, "case {case}");
    }
}

#[tokio::test]
async fn timeout_retries_once_then_fails() {
    struct SleepyStep;

    #[async_trait]
    impl metalforge_engine::Step for SleepyStep {
        async fn run(&self, _ctx: &mut Context) -> Result<StepOutcome, StepError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(StepOutcome::Done)
        }
    }

    struct NoopStep;

    #[async_trait]
    impl metalforge_engine::Step for NoopStep {
        async fn run(&self, _ctx: &mut Context) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Done)
        }
    }

    // The trailing no-op keeps the aggregate budget far above the sleepy
    // step's own deadline, so only the per-step timeout is exercised.
    let specs = vec![
        StepSpec::new("sleepy_step", "never finishes", Arc::new(SleepyStep))
            .with_timeout(Duration::from_millis(50))
            .with_retries(3)
            .with_policy(RetryPolicy::fixed(Duration::from_millis(1))),
        StepSpec::new("noop_step", "immediate", Arc::new(NoopStep)),
    ];

    let result = run_engine(specs).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    // One initial attempt plus exactly one timeout retry.
    assert_eq!(result.attempts[0], 2);
    // The trailing step never started.
    assert_eq!(result.attempts[1], 0);
    assert_eq!(result.workflow_ends, 1);
}

// =============================================================================
// Invariant 3 under concurrent create/cancel storm
// =============================================================================

#[tokio::test]
async fn concurrent_create_and_cancel_storm() {
    let Harness {
        manager, history, stubs,
    } = harness();
    let mut rng = Rng(0xdead_beef);

    // Slow the pull step slightly so cancellations land mid-flight.
    stubs
        .injector()
        .delay("vendor.pull_bios", Duration::from_millis(50));

    let mut ids = Vec::new();
    for i in 0..16 {
        let id = manager
            .create_workflow(
                CreateWorkflowRequest::new("basic_provisioning", format!("srv-{i:02}"))
                    .with_device_type("a1.c5.large")
                    .with_ipmi_target("10.30.0.5", None),
            )
            .await
            .unwrap();
        ids.push(id);
    }

    for id in &ids {
        if rng.below(2) == 0 {
            tokio::time::sleep(Duration::from_millis(rng.below(30))).await;
            manager.cancel_workflow(id).await;
        }
    }

    // Everything reaches a terminal state; nothing deadlocks.
    for id in &ids {
        tokio::time::timeout(Duration::from_secs(10), manager.wait(id))
            .await
            .unwrap_or_else(|_| panic!("{id} never terminated"));

        let snapshot = manager.get_workflow(id).await.unwrap();
        assert!(snapshot.status.is_terminal(), "{id} not terminal");

        let record = history.get(id).await.unwrap();
        assert!(record.status.is_terminal(), "{id} history not finalized");
        assert_eq!(history.finalized_count(id).await, 1);
    }
}

// =============================================================================
// Invariant 7: per-subscriber ordering
// =============================================================================

#[tokio::test]
async fn progress_events_arrive_in_publication_order() {
    let Harness { manager, .. } = harness();
    let mut sub = manager.subscribe_all();

    let id = manager
        .create_workflow(
            CreateWorkflowRequest::new("basic_provisioning", "srv-001")
                .with_device_type("a1.c5.large")
                .with_ipmi_target("10.30.0.5", None),
        )
        .await
        .unwrap();
    manager.wait(&id).await;

    let mut events = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), sub.recv()).await
    {
        if event.workflow_id == id {
            events.push(event);
        }
    }

    assert_eq!(events.first().unwrap().kind, ProgressKind::WorkflowStart);
    assert_eq!(events.last().unwrap().kind, ProgressKind::WorkflowEnd);
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == ProgressKind::WorkflowEnd)
            .count(),
        1,
    );

    // Step indices never move backwards.
    let mut last_index = 0;
    for event in &events {
        if let Some(index) = event.step_index {
            assert!(index >= last_index, "step index regressed");
            last_index = index;
        }
    }

    assert_eq!(sub.dropped(), 0);
}

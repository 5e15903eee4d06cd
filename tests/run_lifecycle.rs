use std::error::Error;
use std::sync::Arc;

use testloader::engine::{OrchestratorOptions, RunState};
use testloader::errors::LoaderError;
use testloader::events::{OutputStream, RunOutcome, TestEvent};
use testloader::types::TestNode;
use testloader_test_utils::{init_tracing, with_timeout, Harness, RunBehaviour};

type TestResult = Result<(), Box<dyn Error>>;

fn finished_outcome(h: &Harness) -> RunOutcome {
    h.recorder
        .events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            TestEvent::RunFinished { outcome } => Some(outcome),
            _ => None,
        })
        .expect("RunFinished recorded")
}

async fn root(h: &Harness) -> Arc<TestNode> {
    h.orchestrator.loaded_test().await.expect("tests loaded")
}

#[tokio::test]
async fn run_relays_progress_between_starting_and_finished() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;
    h.wait_idle().await;

    assert_eq!(
        h.recorder.names(),
        vec![
            "RunStarting",
            "SuiteStarting",
            "SuiteStarting",
            "TestStarting",
            "TestFinished",
            "TestStarting",
            "TestFinished",
            "SuiteFinished",
            "TestStarting",
            "TestFinished",
            "SuiteFinished",
            "RunFinished",
        ]
    );

    match &h.recorder.events()[0] {
        TestEvent::RunStarting { node } => assert!(Arc::ptr_eq(node, &tree)),
        other => panic!("unexpected first event {other:?}"),
    }

    let outcome = finished_outcome(&h);
    let result = outcome.result().expect("run completed");
    let summary = result.summary();
    assert_eq!((summary.total, summary.passed, summary.failed), (3, 3, 0));

    let last = h.orchestrator.last_result().await.expect("result stored");
    assert_eq!(&last, result);
    assert_eq!(h.orchestrator.run_state().await, RunState::Idle);
    Ok(())
}

#[tokio::test]
async fn run_of_a_nested_suite_only_runs_that_suite() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;

    let tree = root(&h).await;
    let math = tree.find("Sample.Math").expect("suite present").clone();
    h.orchestrator.run_test_suite(&math).await?;
    h.recorder.wait_for("RunFinished").await;

    let result = finished_outcome(&h).result().cloned().expect("completed");
    assert_eq!(result.full_name, "Sample.Math");
    assert_eq!(result.summary().total, 2);
    assert!(h.contexts.calls().iter().any(|c| c == "run:1:Sample.Math"));
    Ok(())
}

#[tokio::test]
async fn cancel_stops_the_run_and_returns_to_idle() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;
    h.contexts.set_default_run(RunBehaviour::Gated);

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    with_timeout(h.contexts.wait_run_started()).await;
    assert!(h.orchestrator.is_test_running().await);
    assert_eq!(
        h.orchestrator.running_test().await.map(|n| n.full_name.clone()),
        Some("Sample".to_string())
    );

    with_timeout(h.orchestrator.cancel_test_run()).await;

    // Cancellation is complete when the call returns.
    assert!(!h.orchestrator.is_test_running().await);
    let names = h.recorder.names();
    assert_eq!(names.first(), Some(&"RunStarting"));
    assert_eq!(names.last(), Some(&"RunFinished"));
    assert_eq!(h.recorder.count("RunFinished"), 1);
    assert!(finished_outcome(&h).is_cancelled());
    assert_eq!(h.contexts.cancelled_runs(), 1);
    assert!(h.orchestrator.last_result().await.is_none());

    // The test stays loaded and can run again.
    h.contexts.set_default_run(RunBehaviour::Pass);
    h.recorder.clear();
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;
    assert!(finished_outcome(&h).result().is_some());
    Ok(())
}

#[tokio::test]
async fn cancel_while_idle_does_nothing() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;

    h.orchestrator.cancel_test_run().await;

    assert!(h.recorder.names().is_empty());
    assert_eq!(h.orchestrator.run_state().await, RunState::Idle);
    Ok(())
}

#[tokio::test]
async fn run_request_while_running_is_ignored() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;
    h.contexts.push_run(RunBehaviour::Gated);

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    with_timeout(h.contexts.wait_run_started()).await;

    h.orchestrator.run_test_suite(&tree).await?;
    h.contexts.release_run();
    h.recorder.wait_for("RunFinished").await;
    h.wait_idle().await;

    assert_eq!(h.recorder.count("RunStarting"), 1);
    assert_eq!(h.recorder.count("RunFinished"), 1);
    let runs = h
        .contexts
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("run:"))
        .count();
    assert_eq!(runs, 1);
    Ok(())
}

#[tokio::test]
async fn run_without_loaded_test_is_rejected() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());

    let err = h
        .orchestrator
        .run_test_suite(&TestNode::case("Sample.Smoke"))
        .await
        .expect_err("nothing loaded");
    assert!(matches!(err, LoaderError::NoTestLoaded));
    assert!(h.recorder.names().is_empty());
    Ok(())
}

#[tokio::test]
async fn engine_error_finishes_the_run_as_failed() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;
    h.contexts
        .push_run(RunBehaviour::Error("engine crashed".to_string()));

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;
    h.wait_idle().await;

    let outcome = finished_outcome(&h);
    assert!(!outcome.is_cancelled());
    let err = outcome.error().expect("run failed");
    assert!(matches!(err, LoaderError::Run(_)));
    assert!(err.to_string().contains("engine crashed"));
    assert!(h.orchestrator.last_result().await.is_none());
    Ok(())
}

#[tokio::test]
async fn failing_cases_complete_with_a_failed_result() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;
    h.contexts
        .push_run(RunBehaviour::FailCases("expected 4, got 5".to_string()));

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;

    let result = finished_outcome(&h).result().cloned().expect("completed");
    assert!(!result.is_success());
    assert_eq!(result.summary().failed, 3);
    Ok(())
}

#[tokio::test]
async fn captured_output_is_relayed() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;
    h.contexts
        .push_run(RunBehaviour::Output("hello from a test".to_string()));

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;

    let output: Vec<(OutputStream, String)> = h
        .recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TestEvent::TestOutput { stream, text } => Some((stream, text)),
            _ => None,
        })
        .collect();
    assert_eq!(
        output,
        vec![(OutputStream::Stdout, "hello from a test".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn unloading_during_a_run_cancels_it_first() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;
    h.contexts.set_default_run(RunBehaviour::Gated);

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    with_timeout(h.contexts.wait_run_started()).await;

    with_timeout(h.orchestrator.unload_test()).await;

    let names = h.recorder.names();
    let finished = names.iter().position(|n| *n == "RunFinished").expect("run finished");
    let unloading = names.iter().position(|n| *n == "TestUnloading").expect("unloading");
    assert!(finished < unloading, "events: {names:?}");
    assert!(finished_outcome(&h).is_cancelled());
    assert!(!h.orchestrator.is_test_running().await);
    assert!(!h.orchestrator.is_test_loaded().await);
    Ok(())
}

#[tokio::test]
async fn loading_a_new_test_clears_the_last_result() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions::default());
    h.open().await;

    let tree = root(&h).await;
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;
    h.wait_idle().await;
    assert!(h.orchestrator.status().await.has_last_result);

    h.orchestrator.load_test().await?;
    assert!(h.orchestrator.last_result().await.is_none());
    Ok(())
}

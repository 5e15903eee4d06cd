use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use testloader::engine::OrchestratorOptions;
use testloader::errors::LoaderError;
use testloader::events::TestEvent;
use testloader_test_utils::harness::{DEBUG_MEMBER, PROJECT_PATH};
use testloader_test_utils::{
    grown_tree, init_tracing, sample_tree, with_timeout, Harness, LoadBehaviour, RunBehaviour,
};

type TestResult = Result<(), Box<dyn Error>>;

fn watching() -> OrchestratorOptions {
    OrchestratorOptions {
        reload_on_change: true,
        reload_on_run: false,
    }
}

#[tokio::test]
async fn change_notice_reloads_a_changed_tree() -> TestResult {
    init_tracing();
    let h = Harness::new(watching());
    h.open().await;
    let before = h.orchestrator.loaded_test().await.expect("loaded");

    h.contexts.set_tree(grown_tree());
    h.watchers.trigger(DEBUG_MEMBER);
    h.recorder.wait_for("TestReloaded").await;

    assert_eq!(h.recorder.names(), vec!["TestReloading", "TestReloaded"]);
    let events = h.recorder.events();
    match &events[0] {
        TestEvent::TestReloading { path, tree } => {
            assert!(Arc::ptr_eq(tree, &before));
            assert_eq!(path, &PathBuf::from(DEBUG_MEMBER));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(events[1].path(), Some(&PathBuf::from(DEBUG_MEMBER)));

    let after = h.orchestrator.loaded_test().await.expect("still loaded");
    assert_eq!(after.test_count(), 4);
    assert_eq!(h.contexts.created(), 2);
    assert_eq!(h.contexts.unloaded(), 1);
    Ok(())
}

#[tokio::test]
async fn identical_reload_is_not_announced() -> TestResult {
    init_tracing();
    let h = Harness::new(watching());
    h.open().await;
    let before = h.orchestrator.loaded_test().await.expect("loaded");

    h.orchestrator.reload_test().await;

    assert_eq!(h.recorder.names(), vec!["TestReloading"]);
    assert_eq!(
        h.recorder.events()[0].path(),
        Some(&PathBuf::from(PROJECT_PATH))
    );
    // A fresh context and snapshot are installed all the same.
    let after = h.orchestrator.loaded_test().await.expect("loaded");
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(*before, *after);
    assert_eq!(h.contexts.created(), 2);
    assert_eq!(h.contexts.unloaded(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_reload_keeps_the_previous_tree() -> TestResult {
    init_tracing();
    let h = Harness::new(watching());
    h.open().await;
    let before = h.orchestrator.loaded_test().await.expect("loaded");

    h.contexts
        .push_load(LoadBehaviour::Fail("file is locked".to_string()));
    h.orchestrator.reload_test().await;

    assert_eq!(h.recorder.names(), vec!["TestReloading", "TestReloadFailed"]);
    match &h.recorder.events()[1] {
        TestEvent::TestReloadFailed { error, .. } => {
            assert!(matches!(**error, LoaderError::Reload { .. }), "got {error:?}");
        }
        other => panic!("unexpected event {other:?}"),
    }

    let after = h.orchestrator.loaded_test().await.expect("still loaded");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(h.contexts.unloaded(), 0);

    // The previous context still runs.
    h.recorder.clear();
    h.orchestrator.run_test_suite(&after).await?;
    h.recorder.wait_for("RunFinished").await;
    assert!(h.contexts.calls().iter().any(|c| c == "run:1:Sample"));
    Ok(())
}

#[tokio::test]
async fn change_during_a_run_is_deferred_until_the_next_run() -> TestResult {
    init_tracing();
    let h = Harness::new(watching());
    h.open().await;
    h.contexts.push_run(RunBehaviour::Gated);

    let tree = h.orchestrator.loaded_test().await.expect("loaded");
    h.orchestrator.run_test_suite(&tree).await?;
    with_timeout(h.contexts.wait_run_started()).await;

    h.contexts.set_tree(grown_tree());
    h.watchers.trigger(DEBUG_MEMBER);
    h.wait_reload_pending().await;

    assert_eq!(h.recorder.count("TestReloading"), 0);
    assert_eq!(h.contexts.created(), 1);

    h.contexts.release_run();
    h.recorder.wait_for("RunFinished").await;
    h.wait_idle().await;
    assert!(h.orchestrator.is_reload_pending().await);

    h.recorder.clear();
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;

    let names = h.recorder.names();
    assert_eq!(&names[..3], &["TestReloading", "TestReloaded", "RunStarting"]);
    assert!(!h.orchestrator.is_reload_pending().await);

    // The run targets the reloaded snapshot.
    let reloaded = h.orchestrator.loaded_test().await.expect("loaded");
    assert_eq!(reloaded.test_count(), 4);
    match &h.recorder.events()[2] {
        TestEvent::RunStarting { node } => assert!(Arc::ptr_eq(node, &reloaded)),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        h.orchestrator
            .last_result()
            .await
            .map(|r| r.summary().total),
        Some(4)
    );
    Ok(())
}

#[tokio::test]
async fn failed_pre_run_reload_still_runs_the_previous_tree() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions {
        reload_on_change: false,
        reload_on_run: true,
    });
    h.open().await;
    h.contexts
        .push_load(LoadBehaviour::Fail("half-written artifact".to_string()));

    let tree = h.orchestrator.loaded_test().await.expect("loaded");
    h.orchestrator.run_test_suite(&tree).await?;
    h.recorder.wait_for("RunFinished").await;

    let names = h.recorder.names();
    assert_eq!(&names[..3], &["TestReloading", "TestReloadFailed", "RunStarting"]);
    assert!(h.recorder.events().iter().any(|e| matches!(
        e,
        TestEvent::RunFinished { outcome } if outcome.result().is_some()
    )));
    Ok(())
}

#[tokio::test]
async fn reload_on_run_reloads_before_every_run() -> TestResult {
    init_tracing();
    let h = Harness::new(OrchestratorOptions {
        reload_on_change: false,
        reload_on_run: true,
    });
    h.open().await;

    let tree = h.orchestrator.loaded_test().await.expect("loaded");
    for _ in 0..2 {
        h.orchestrator.run_test_suite(&tree).await?;
        h.recorder.wait_for("RunFinished").await;
        h.wait_idle().await;
        assert_eq!(&h.recorder.names()[..2], &["TestReloading", "RunStarting"]);
        h.recorder.clear();
    }
    assert_eq!(h.contexts.created(), 3);
    Ok(())
}

#[tokio::test]
async fn notices_from_a_replaced_watcher_are_dropped() -> TestResult {
    init_tracing();
    let h = Harness::new(watching());
    h.open().await;

    // Replaces the context and the watcher.
    h.orchestrator.load_test().await?;
    assert_eq!(h.watchers.started(), 2);
    h.recorder.clear();

    h.contexts.set_tree(grown_tree());
    h.watchers.trigger_stopped(DEBUG_MEMBER);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.recorder.names().is_empty());
    assert_eq!(h.contexts.created(), 2);

    // The live watcher still works.
    h.watchers.trigger(DEBUG_MEMBER);
    h.recorder.wait_for("TestReloaded").await;
    Ok(())
}

#[tokio::test]
async fn reload_with_nothing_loaded_is_ignored() -> TestResult {
    init_tracing();
    let h = Harness::new(watching());
    h.orchestrator.load_project(PROJECT_PATH).await?;
    h.recorder.clear();

    h.orchestrator.reload_test().await;

    assert!(h.recorder.names().is_empty());
    assert_eq!(h.contexts.created(), 0);
    Ok(())
}

#[tokio::test]
async fn old_context_unload_failure_during_reload_is_reported() -> TestResult {
    init_tracing();
    let h = Harness::new(watching());
    h.open().await;
    h.contexts.fail_unloads(true);
    h.contexts.set_tree(grown_tree());

    h.orchestrator.reload_test().await;

    assert_eq!(
        h.recorder.names(),
        vec!["TestReloading", "TestUnloadFailed", "TestReloaded"]
    );
    let tree = h.orchestrator.loaded_test().await.expect("new tree installed");
    assert_eq!(tree.test_count(), 4);
    Ok(())
}

#[tokio::test]
async fn reload_keeps_the_watcher_running() -> TestResult {
    init_tracing();
    let h = Harness::with_tree(sample_tree(), watching());
    h.open().await;

    h.contexts.set_tree(grown_tree());
    h.watchers.trigger(DEBUG_MEMBER);
    h.recorder.wait_for("TestReloaded").await;

    assert_eq!(h.watchers.started(), 1);
    assert_eq!(h.watchers.active(), 1);

    h.contexts.set_tree(sample_tree());
    h.watchers.trigger(DEBUG_MEMBER);
    h.recorder.wait_for_count("TestReloaded", 2).await;
    Ok(())
}

// src/engine/worker.rs

//! Background execution of a single run.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::orchestrator::Inner;
use crate::context::{ExecutionContext, RunListener};
use crate::errors::LoaderError;
use crate::events::{EventDispatcher, OutputStream, RunOutcome, TestEvent};
use crate::types::{TestNode, TestResult};

/// Forwards engine notifications onto the event stream.
struct EventRelay {
    events: Arc<EventDispatcher>,
}

impl RunListener for EventRelay {
    fn test_started(&self, case: &TestNode) {
        self.events
            .emit(TestEvent::TestStarting { case: case.clone() });
    }

    fn test_finished(&self, result: &TestResult) {
        self.events.emit(TestEvent::TestFinished {
            result: result.clone(),
        });
    }

    fn suite_started(&self, suite: &TestNode) {
        self.events.emit(TestEvent::SuiteStarting {
            suite: suite.clone(),
        });
    }

    fn suite_finished(&self, result: &TestResult) {
        self.events.emit(TestEvent::SuiteFinished {
            result: result.clone(),
        });
    }

    fn output(&self, stream: OutputStream, text: &str) {
        self.events.emit(TestEvent::TestOutput {
            stream,
            text: text.to_string(),
        });
    }
}

/// Execute `node` in `context` and report the outcome.
///
/// Exactly one `RunFinished` is emitted per call, after which the run is
/// cleared from the orchestrator state.
pub(crate) async fn run_worker(
    inner: Arc<Inner>,
    run_id: u64,
    context: Arc<dyn ExecutionContext>,
    node: Arc<TestNode>,
    cancel_rx: oneshot::Receiver<()>,
) {
    inner.emit(TestEvent::RunStarting {
        node: Arc::clone(&node),
    });

    let listener: Arc<dyn RunListener> = Arc::new(EventRelay {
        events: Arc::clone(&inner.events),
    });

    let mut engine = tokio::spawn({
        let node = Arc::clone(&node);
        async move { context.run(&node, listener).await }
    });

    let outcome = tokio::select! {
        biased;

        cancel = cancel_rx => match cancel {
            Ok(()) => {
                debug!(run_id, "cancel signal received; stopping engine");
                engine.abort();
                if let Ok(joined) = engine.await {
                    // Finished just before the abort landed; still cancelled.
                    debug!(run_id, ok = joined.is_ok(), "engine completed while cancelling");
                }
                RunOutcome::Failed(Arc::new(LoaderError::RunCancelled))
            }
            // Sender dropped without a signal: keep waiting for the engine.
            Err(_) => join_outcome(engine.await),
        },

        joined = &mut engine => join_outcome(joined),
    };

    match &outcome {
        RunOutcome::Completed(result) => {
            let summary = result.summary();
            info!(
                run_id,
                total = summary.total,
                passed = summary.passed,
                failed = summary.failed,
                ignored = summary.ignored,
                "test run completed"
            );
        }
        RunOutcome::Failed(err) if outcome.is_cancelled() => {
            info!(run_id, "{}", err);
        }
        RunOutcome::Failed(err) => {
            warn!(run_id, error = %err, "test run failed");
        }
    }

    let mut state = inner.state.lock().await;
    if let RunOutcome::Completed(result) = &outcome {
        state.last_result = Some(result.clone());
    }
    inner.emit(TestEvent::RunFinished { outcome });
    state.finish_run(run_id);
}

fn join_outcome(joined: Result<anyhow::Result<TestResult>, JoinError>) -> RunOutcome {
    match joined {
        Ok(Ok(result)) => RunOutcome::Completed(result),
        Ok(Err(err)) => RunOutcome::Failed(Arc::new(LoaderError::Run(err))),
        Err(err) if err.is_cancelled() => RunOutcome::Failed(Arc::new(LoaderError::RunCancelled)),
        Err(err) => RunOutcome::Failed(Arc::new(LoaderError::Run(anyhow::anyhow!(
            "test engine panicked: {err}"
        )))),
    }
}

// src/events/mod.rs

//! Lifecycle events and their fan-out.
//!
//! - [`TestEvent`] is the full catalogue of what the orchestrator reports.
//! - [`dispatcher`] delivers events, in emission order, to any number of
//!   independent subscribers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::LoaderError;
use crate::types::{TestNode, TestResult};

pub mod dispatcher;

pub use dispatcher::{ChannelSubscriber, EventDispatcher, EventSubscriber, SubscriptionId};

/// Which captured stream a piece of test output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Payload of [`TestEvent::RunFinished`].
///
/// Clients tell a completed run from a failed one by the variant; a
/// cancelled run is a failure carrying [`LoaderError::RunCancelled`].
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(TestResult),
    Failed(Arc<LoaderError>),
}

impl RunOutcome {
    pub fn result(&self) -> Option<&TestResult> {
        match self {
            RunOutcome::Completed(result) => Some(result),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&LoaderError> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Failed(err) => Some(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error(), Some(LoaderError::RunCancelled))
    }
}

/// Everything the orchestrator emits.
///
/// Trees are shared as `Arc<TestNode>`, so a subscriber can check with
/// `Arc::ptr_eq` whether two events refer to the same loaded snapshot.
#[derive(Debug, Clone)]
pub enum TestEvent {
    ProjectLoading { path: PathBuf },
    ProjectLoaded { path: PathBuf },
    ProjectUnloading { path: PathBuf },
    ProjectUnloaded { path: PathBuf },

    TestLoading { path: PathBuf },
    TestLoaded { path: PathBuf, tree: Arc<TestNode> },
    TestLoadFailed { path: PathBuf, error: Arc<LoaderError> },
    TestUnloading { path: PathBuf, tree: Arc<TestNode> },
    TestUnloaded { path: PathBuf, tree: Arc<TestNode> },
    TestUnloadFailed { path: PathBuf, error: Arc<LoaderError> },
    // In the three reload events `path` is the changed member when a
    // watcher triggered the reload, and the project path otherwise.
    TestReloading { path: PathBuf, tree: Arc<TestNode> },
    TestReloaded { path: PathBuf, tree: Arc<TestNode> },
    TestReloadFailed { path: PathBuf, error: Arc<LoaderError> },

    RunStarting { node: Arc<TestNode> },
    RunFinished { outcome: RunOutcome },

    /// Relayed from the execution context during a run.
    TestStarting { case: TestNode },
    TestFinished { result: TestResult },
    SuiteStarting { suite: TestNode },
    SuiteFinished { result: TestResult },
    TestOutput { stream: OutputStream, text: String },
}

impl TestEvent {
    /// Stable event name, used in logs and handy for assertions.
    pub fn name(&self) -> &'static str {
        match self {
            TestEvent::ProjectLoading { .. } => "ProjectLoading",
            TestEvent::ProjectLoaded { .. } => "ProjectLoaded",
            TestEvent::ProjectUnloading { .. } => "ProjectUnloading",
            TestEvent::ProjectUnloaded { .. } => "ProjectUnloaded",
            TestEvent::TestLoading { .. } => "TestLoading",
            TestEvent::TestLoaded { .. } => "TestLoaded",
            TestEvent::TestLoadFailed { .. } => "TestLoadFailed",
            TestEvent::TestUnloading { .. } => "TestUnloading",
            TestEvent::TestUnloaded { .. } => "TestUnloaded",
            TestEvent::TestUnloadFailed { .. } => "TestUnloadFailed",
            TestEvent::TestReloading { .. } => "TestReloading",
            TestEvent::TestReloaded { .. } => "TestReloaded",
            TestEvent::TestReloadFailed { .. } => "TestReloadFailed",
            TestEvent::RunStarting { .. } => "RunStarting",
            TestEvent::RunFinished { .. } => "RunFinished",
            TestEvent::TestStarting { .. } => "TestStarting",
            TestEvent::TestFinished { .. } => "TestFinished",
            TestEvent::SuiteStarting { .. } => "SuiteStarting",
            TestEvent::SuiteFinished { .. } => "SuiteFinished",
            TestEvent::TestOutput { .. } => "TestOutput",
        }
    }

    /// The artifact path for project/test lifecycle events.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            TestEvent::ProjectLoading { path }
            | TestEvent::ProjectLoaded { path }
            | TestEvent::ProjectUnloading { path }
            | TestEvent::ProjectUnloaded { path }
            | TestEvent::TestLoading { path }
            | TestEvent::TestLoaded { path, .. }
            | TestEvent::TestLoadFailed { path, .. }
            | TestEvent::TestUnloading { path, .. }
            | TestEvent::TestUnloaded { path, .. }
            | TestEvent::TestUnloadFailed { path, .. }
            | TestEvent::TestReloading { path, .. }
            | TestEvent::TestReloaded { path, .. }
            | TestEvent::TestReloadFailed { path, .. } => Some(path),
            _ => None,
        }
    }
}

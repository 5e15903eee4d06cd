use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use testloader::engine::{Collaborators, Orchestrator, OrchestratorOptions};
use testloader::events::EventDispatcher;
use testloader::types::TestNode;
use testloader::workdir::WorkingDirectory;

use crate::builders::{case, suite, InMemoryProjects, ProjectBuilder};
use crate::fake_context::FakeContextFactory;
use crate::fake_watcher::ManualWatcherFactory;
use crate::recorder::EventRecorder;

/// Project registered by [`Harness::new`].
pub const PROJECT_PATH: &str = "/work/Sample.Tests.toml";
/// Second project, for switching between projects.
pub const OTHER_PROJECT_PATH: &str = "/work/Other.Tests.toml";
/// The single member of the `Debug` configuration, as resolved.
pub const DEBUG_MEMBER: &str = "/work/bin/Debug/Sample.Tests.dll";

/// Three cases, two of them in a nested suite.
pub fn sample_tree() -> TestNode {
    suite(
        "Sample",
        vec![
            suite(
                "Sample.Math",
                vec![case("Sample.Math.Adds"), case("Sample.Math.Subtracts")],
            ),
            case("Sample.Smoke"),
        ],
    )
}

/// `sample_tree` plus one case.
pub fn grown_tree() -> TestNode {
    let mut tree = sample_tree();
    tree.children.push(case("Sample.Added"));
    tree
}

/// An orchestrator wired to scripted collaborators.
///
/// Registered projects:
/// - [`PROJECT_PATH`]: `Debug` (active, one member) and `Empty` (no members).
/// - [`OTHER_PROJECT_PATH`]: `Default` with one member.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub contexts: FakeContextFactory,
    pub watchers: ManualWatcherFactory,
    pub projects: Arc<InMemoryProjects>,
    pub recorder: Arc<EventRecorder>,
    pub workdir: WorkingDirectory,
}

impl Harness {
    /// Must be called from within a Tokio runtime.
    pub fn new(options: OrchestratorOptions) -> Self {
        Self::with_tree(sample_tree(), options)
    }

    pub fn with_tree(tree: TestNode, options: OrchestratorOptions) -> Self {
        let projects = Arc::new(
            InMemoryProjects::new()
                .with(
                    ProjectBuilder::new(PROJECT_PATH)
                        .with_config("Debug", &["Sample.Tests.dll"])
                        .with_base_path("Debug", "bin/Debug")
                        .with_config("Empty", &[])
                        .active("Debug")
                        .build(),
                )
                .with(
                    ProjectBuilder::new(OTHER_PROJECT_PATH)
                        .with_config("Default", &["lib/Other.Tests.dll"])
                        .build(),
                ),
        );
        let contexts = FakeContextFactory::new(tree);
        let watchers = ManualWatcherFactory::new();
        let workdir = WorkingDirectory::new();
        let events = Arc::new(EventDispatcher::new());
        let recorder = EventRecorder::attach(&events);

        let collaborators = Collaborators::new(projects.clone(), Arc::new(contexts.clone()))
            .with_watchers(Arc::new(watchers.clone()))
            .with_workdir(workdir.clone())
            .with_events(events);

        Self {
            orchestrator: Orchestrator::new(collaborators, options),
            contexts,
            watchers,
            projects,
            recorder,
            workdir,
        }
    }

    pub fn project_path(&self) -> PathBuf {
        PathBuf::from(PROJECT_PATH)
    }

    /// Open the default project and clear the recorded events.
    pub async fn open(&self) {
        self.orchestrator
            .open_test(PROJECT_PATH)
            .await
            .expect("opening the sample project");
        assert!(self.orchestrator.is_test_loaded().await, "sample tests should load");
        self.recorder.clear();
    }

    /// Wait until no run is in flight. Panics after five seconds.
    pub async fn wait_idle(&self) {
        let poll = async {
            while self.orchestrator.is_test_running().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), poll)
            .await
            .expect("run still in progress after 5 seconds");
    }

    /// Wait until a reload has been deferred. Panics after five seconds.
    pub async fn wait_reload_pending(&self) {
        let poll = async {
            while !self.orchestrator.is_reload_pending().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), poll)
            .await
            .expect("no reload deferred within 5 seconds");
    }
}

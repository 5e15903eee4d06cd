// src/engine/orchestrator.rs

//! Project and test lifecycle, run start and cancellation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::state::{ActiveRun, InstalledWatcher, LoadedTest, LoaderState};
use super::worker::run_worker;
use super::{ChangeNotice, LoaderStatus, OrchestratorOptions, RunState};
use crate::context::{ContextFactory, ExecutionContext};
use crate::errors::{LoaderError, Result};
use crate::events::{EventDispatcher, TestEvent};
use crate::project::{Project, ProjectModel};
use crate::types::{TestNode, TestResult};
use crate::watch::{ChangeCallback, WatcherFactory};
use crate::workdir::WorkingDirectory;

/// External capabilities the orchestrator drives.
pub struct Collaborators {
    pub projects: Arc<dyn ProjectModel>,
    pub contexts: Arc<dyn ContextFactory>,
    /// Required for `reload_on_change`; without it no watcher is installed.
    pub watchers: Option<Arc<dyn WatcherFactory>>,
    pub workdir: WorkingDirectory,
    pub events: Arc<EventDispatcher>,
}

impl Collaborators {
    pub fn new(projects: Arc<dyn ProjectModel>, contexts: Arc<dyn ContextFactory>) -> Self {
        Self {
            projects,
            contexts,
            watchers: None,
            workdir: WorkingDirectory::new(),
            events: Arc::new(EventDispatcher::new()),
        }
    }

    pub fn with_watchers(mut self, watchers: Arc<dyn WatcherFactory>) -> Self {
        self.watchers = Some(watchers);
        self
    }

    pub fn with_workdir(mut self, workdir: WorkingDirectory) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }
}

/// Shared core behind every [`Orchestrator`] handle.
pub(crate) struct Inner {
    pub(crate) state: Mutex<LoaderState>,
    pub(crate) events: Arc<EventDispatcher>,
    pub(crate) projects: Arc<dyn ProjectModel>,
    pub(crate) contexts: Arc<dyn ContextFactory>,
    pub(crate) watchers: Option<Arc<dyn WatcherFactory>>,
    pub(crate) workdir: WorkingDirectory,
    pub(crate) options: OrchestratorOptions,
    pub(crate) change_tx: mpsc::UnboundedSender<ChangeNotice>,
}

/// Coordinates loading, running and reloading of one test artifact.
///
/// Public operations are meant to be called from a single logical caller.
/// Failures of load, unload, reload and run are reported on the event
/// stream rather than returned; the `Result`s here only carry precondition
/// errors such as [`LoaderError::NoProjectLoaded`] and project resolution
/// failures.
///
/// Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator. Must be called from within a Tokio runtime:
    /// a background task is spawned to receive watcher notifications.
    pub fn new(collaborators: Collaborators, options: OrchestratorOptions) -> Self {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            state: Mutex::new(LoaderState::default()),
            events: collaborators.events,
            projects: collaborators.projects,
            contexts: collaborators.contexts,
            watchers: collaborators.watchers,
            workdir: collaborators.workdir,
            options,
            change_tx,
        });

        tokio::spawn(change_pump(Arc::downgrade(&inner), change_rx));

        Self { inner }
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.inner.events
    }

    pub fn options(&self) -> OrchestratorOptions {
        self.inner.options
    }

    pub fn working_directory(&self) -> &WorkingDirectory {
        &self.inner.workdir
    }

    // ----- project lifecycle ------------------------------------------------

    /// Resolve `path` into a project and make it current.
    ///
    /// Resolution failures are returned and leave the current project
    /// untouched. Any current project is unloaded first.
    pub async fn load_project(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        self.cancel_test_run().await;

        let mut state = self.inner.state.lock().await;
        self.inner.emit(TestEvent::ProjectLoading { path: path.clone() });

        let project = self
            .inner
            .projects
            .resolve(&path)
            .map_err(|source| LoaderError::ProjectLoad {
                path: path.clone(),
                source,
            })?;

        self.inner.install_project(&mut state, project).await;
        Ok(())
    }

    /// Make an already-built project current.
    pub async fn set_project(&self, project: Project) {
        self.cancel_test_run().await;
        let mut state = self.inner.state.lock().await;
        self.inner.install_project(&mut state, project).await;
    }

    /// Load a project and, if its active configuration is loadable, its tests.
    pub async fn open_test(&self, path: impl AsRef<Path>) -> Result<()> {
        self.load_project(path).await?;

        let mut state = self.inner.state.lock().await;
        if state.project.as_ref().is_some_and(Project::is_loadable) {
            self.inner.load_test_locked(&mut state).await?;
        }
        Ok(())
    }

    pub async fn unload_project(&self) -> Result<()> {
        self.cancel_test_run().await;
        let mut state = self.inner.state.lock().await;
        if state.project.is_none() {
            return Err(LoaderError::NoProjectLoaded);
        }
        self.inner.unload_project_locked(&mut state).await;
        Ok(())
    }

    /// Switch the active configuration, then load or unload tests to match.
    pub async fn set_active_config(&self, name: &str) -> Result<()> {
        self.cancel_test_run().await;
        let mut state = self.inner.state.lock().await;

        let project = state
            .project
            .as_mut()
            .ok_or(LoaderError::NoProjectLoaded)?;
        project.set_active_config(name);
        let loadable = project.is_loadable();
        info!(config = %name, loadable, "active configuration changed");

        if loadable {
            self.inner.load_test_locked(&mut state).await
        } else {
            self.inner.unload_test_locked(&mut state).await;
            Ok(())
        }
    }

    // ----- test lifecycle ---------------------------------------------------

    /// Load the current project's tests into a fresh execution context.
    ///
    /// A test that is already loaded is unloaded first.
    pub async fn load_test(&self) -> Result<()> {
        self.cancel_test_run().await;
        let mut state = self.inner.state.lock().await;
        self.inner.load_test_locked(&mut state).await
    }

    /// Unload the current test; does nothing if none is loaded.
    pub async fn unload_test(&self) {
        self.cancel_test_run().await;
        let mut state = self.inner.state.lock().await;
        self.inner.unload_test_locked(&mut state).await;
    }

    /// Reload as if the current artifact had changed on disk.
    pub async fn reload_test(&self) {
        let mut state = self.inner.state.lock().await;
        let Some(path) = state.project_path() else {
            debug!("reload requested with no project loaded; ignoring");
            return;
        };
        self.inner.reload_locked(&mut state, path).await;
    }

    // ----- runs -------------------------------------------------------------

    /// Start running `node` on a background worker.
    ///
    /// Ignored while another run is in progress. A pending reload (or
    /// `reload_on_run`) is performed first; if that reload fails the run
    /// proceeds against the previously loaded tree.
    pub async fn run_test_suite(&self, node: &TestNode) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        if let Some(run) = &state.running {
            debug!(
                run_id = run.run_id,
                requested = %node.full_name,
                "run already in progress; ignoring request"
            );
            return Ok(());
        }
        if state.loaded.is_none() {
            return Err(LoaderError::NoTestLoaded);
        }

        if state.reload_pending || self.inner.options.reload_on_run {
            if let Some(path) = state.project_path() {
                debug!(pending = state.reload_pending, "reloading before run");
                self.inner.reload_locked(&mut state, path).await;
            }
        }

        let loaded = state.loaded.as_ref().ok_or(LoaderError::NoTestLoaded)?;
        let context = Arc::clone(&loaded.context);
        let target = resolve_target(&loaded.tree, node);

        state.next_run_id += 1;
        let run_id = state.next_run_id;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        info!(run_id, test = %target.full_name, "starting test run");

        // The worker cannot finish before we release the state lock.
        let handle = tokio::spawn(run_worker(
            Arc::clone(&self.inner),
            run_id,
            context,
            Arc::clone(&target),
            cancel_rx,
        ));

        state.running = Some(ActiveRun {
            run_id,
            node: target,
            cancel: Some(cancel_tx),
            handle: Some(handle),
        });
        Ok(())
    }

    /// Stop the in-flight run and wait for its worker to terminate.
    ///
    /// Does nothing when idle. Afterwards the orchestrator is always idle.
    pub async fn cancel_test_run(&self) {
        let (run_id, cancel, handle) = {
            let mut state = self.inner.state.lock().await;
            let Some(run) = state.running.as_mut() else {
                return;
            };
            (run.run_id, run.cancel.take(), run.handle.take())
        };

        info!(run_id, "cancelling test run");

        if let Some(cancel) = cancel {
            if cancel.send(()).is_err() {
                debug!(run_id, "run worker already finished while cancelling");
            }
        }

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(run_id, error = %err, "run worker terminated abnormally");
            }
        }

        // Normally the worker already cleared this as its last step.
        let mut state = self.inner.state.lock().await;
        if state.finish_run(run_id) {
            debug!(run_id, "cleared run state after worker exit");
        }
    }

    // ----- queries ----------------------------------------------------------

    pub async fn status(&self) -> LoaderStatus {
        let state = self.inner.state.lock().await;
        LoaderStatus {
            project_path: state.project_path(),
            active_config: state
                .project
                .as_ref()
                .and_then(|p| p.active_config_name().map(str::to_string)),
            loaded_test: state.loaded.as_ref().map(|l| Arc::clone(&l.tree)),
            run_state: if state.is_running() {
                RunState::Running
            } else {
                RunState::Idle
            },
            running_test: state.running.as_ref().map(|r| Arc::clone(&r.node)),
            reload_pending: state.reload_pending,
            has_last_result: state.last_result.is_some(),
        }
    }

    pub async fn is_project_loaded(&self) -> bool {
        self.inner.state.lock().await.project.is_some()
    }

    pub async fn is_test_loaded(&self) -> bool {
        self.inner.state.lock().await.loaded.is_some()
    }

    pub async fn is_test_running(&self) -> bool {
        self.inner.state.lock().await.is_running()
    }

    pub async fn is_reload_pending(&self) -> bool {
        self.inner.state.lock().await.reload_pending
    }

    pub async fn run_state(&self) -> RunState {
        if self.is_test_running().await {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub async fn project(&self) -> Option<Project> {
        self.inner.state.lock().await.project.clone()
    }

    pub async fn test_file_name(&self) -> Option<PathBuf> {
        self.inner.state.lock().await.project_path()
    }

    pub async fn loaded_test(&self) -> Option<Arc<TestNode>> {
        let state = self.inner.state.lock().await;
        state.loaded.as_ref().map(|l| Arc::clone(&l.tree))
    }

    pub async fn running_test(&self) -> Option<Arc<TestNode>> {
        let state = self.inner.state.lock().await;
        state.running.as_ref().map(|r| Arc::clone(&r.node))
    }

    pub async fn last_result(&self) -> Option<TestResult> {
        self.inner.state.lock().await.last_result.clone()
    }
}

/// Pick the node to run from the current tree by full name, so a run
/// requested against a pre-reload snapshot targets the reloaded one.
fn resolve_target(tree: &Arc<TestNode>, requested: &TestNode) -> Arc<TestNode> {
    if tree.full_name == requested.full_name {
        return Arc::clone(tree);
    }
    match tree.find(&requested.full_name) {
        Some(found) => Arc::new(found.clone()),
        None => {
            warn!(
                test = %requested.full_name,
                "requested test is not in the loaded tree; running it as given"
            );
            Arc::new(requested.clone())
        }
    }
}

/// Forward watcher notifications into the orchestrator until it is dropped.
async fn change_pump(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<ChangeNotice>) {
    while let Some(notice) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_change_notice(notice).await;
    }
    debug!("change notification pump finished");
}

impl Inner {
    pub(crate) fn emit(&self, event: TestEvent) {
        self.events.emit(event);
    }

    async fn install_project(&self, state: &mut LoaderState, project: Project) {
        if state.project.is_some() {
            self.unload_project_locked(state).await;
        }

        let path = project.path().to_path_buf();
        info!(
            path = %path.display(),
            wrapper = project.is_wrapper(),
            config = ?project.active_config_name(),
            "project loaded"
        );
        state.project = Some(project);
        self.emit(TestEvent::ProjectLoaded { path });
    }

    pub(crate) async fn unload_project_locked(&self, state: &mut LoaderState) {
        let Some(path) = state.project_path() else {
            return;
        };

        self.emit(TestEvent::ProjectUnloading { path: path.clone() });

        if state.loaded.is_some() {
            self.unload_test_locked(state).await;
        }
        state.project = None;

        info!(path = %path.display(), "project unloaded");
        self.emit(TestEvent::ProjectUnloaded { path });
    }

    pub(crate) async fn load_test_locked(&self, state: &mut LoaderState) -> Result<()> {
        let project = state
            .project
            .clone()
            .ok_or(LoaderError::NoProjectLoaded)?;

        if state.loaded.is_some() {
            self.unload_test_locked(state).await;
        }

        let path = project.path().to_path_buf();
        self.emit(TestEvent::TestLoading { path: path.clone() });

        match self.load_context(&project).await {
            Ok((context, tree)) => {
                let tree = Arc::new(tree);
                state.loaded = Some(LoadedTest {
                    context,
                    tree: Arc::clone(&tree),
                });
                state.last_result = None;
                state.reload_pending = false;

                if let Some(dir) = project.working_directory() {
                    self.workdir.set(dir);
                }

                info!(
                    path = %path.display(),
                    root = %tree.full_name,
                    tests = tree.test_count(),
                    "tests loaded"
                );
                self.emit(TestEvent::TestLoaded { path, tree });

                if self.options.reload_on_change {
                    self.install_watcher(state, &project);
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "test load failed");
                self.emit(TestEvent::TestLoadFailed {
                    path,
                    error: Arc::new(err),
                });
            }
        }
        Ok(())
    }

    pub(crate) async fn unload_test_locked(&self, state: &mut LoaderState) {
        let Some(tree) = state.loaded.as_ref().map(|l| Arc::clone(&l.tree)) else {
            return;
        };
        let path = state.project_path().unwrap_or_default();

        self.emit(TestEvent::TestUnloading {
            path: path.clone(),
            tree: Arc::clone(&tree),
        });

        state.remove_watcher();

        let result = match state.loaded.take() {
            Some(loaded) => loaded.context.unload().await,
            None => Ok(()),
        };

        // The context is gone either way.
        state.last_result = None;
        state.reload_pending = false;
        self.workdir.clear();

        match result {
            Ok(()) => {
                info!(path = %path.display(), "tests unloaded");
                self.emit(TestEvent::TestUnloaded { path, tree });
            }
            Err(source) => {
                warn!(path = %path.display(), error = %source, "test unload failed");
                self.emit(TestEvent::TestUnloadFailed {
                    path: path.clone(),
                    error: Arc::new(LoaderError::Unload { path, source }),
                });
            }
        }
    }

    /// Create a fresh context and load `project` into it.
    ///
    /// Nothing is installed; on failure the new context is dropped.
    pub(crate) async fn load_context(
        &self,
        project: &Project,
    ) -> Result<(Arc<dyn ExecutionContext>, TestNode)> {
        let path = project.path().to_path_buf();

        if !project.is_loadable() {
            return Err(LoaderError::NotLoadable { path });
        }

        let context = self
            .contexts
            .create()
            .map_err(|source| LoaderError::TestLoad {
                path: path.clone(),
                source,
            })?;

        let tree = context
            .load(project)
            .await
            .map_err(|source| LoaderError::TestLoad { path, source })?;

        Ok((context, tree))
    }

    fn install_watcher(&self, state: &mut LoaderState, project: &Project) {
        state.remove_watcher();

        let Some(factory) = &self.watchers else {
            warn!("reload on change is enabled but no watcher factory is configured");
            return;
        };

        state.watch_generation += 1;
        let generation = state.watch_generation;

        let tx = self.change_tx.clone();
        let on_change: ChangeCallback = Arc::new(move |path: PathBuf| {
            let _ = tx.send(ChangeNotice { path, generation });
        });

        let members = project.active_members();
        let mut watcher = factory.create();
        match watcher.start(&members, on_change) {
            Ok(()) => {
                debug!(generation, files = members.len(), "change watcher installed");
                state.watcher = Some(InstalledWatcher {
                    generation,
                    watcher,
                });
            }
            Err(err) => {
                warn!(error = %err, "failed to start change watcher; automatic reload disabled");
            }
        }
    }
}

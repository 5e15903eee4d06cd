// src/engine/state.rs

//! Mutable orchestrator state.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::context::ExecutionContext;
use crate::project::Project;
use crate::types::{TestNode, TestResult};
use crate::watch::ChangeWatcher;

/// A loaded tree together with the context that loaded it.
///
/// Keeping both in one value makes "a context exists iff a tree is loaded"
/// hold by construction.
pub struct LoadedTest {
    pub context: Arc<dyn ExecutionContext>,
    pub tree: Arc<TestNode>,
}

/// The in-flight run.
pub struct ActiveRun {
    pub run_id: u64,
    pub node: Arc<TestNode>,
    /// Taken by whoever cancels the run.
    pub cancel: Option<oneshot::Sender<()>>,
    /// Taken by whoever joins the worker.
    pub handle: Option<JoinHandle<()>>,
}

pub struct InstalledWatcher {
    pub generation: u64,
    pub watcher: Box<dyn ChangeWatcher>,
}

#[derive(Default)]
pub struct LoaderState {
    pub project: Option<Project>,
    pub loaded: Option<LoadedTest>,
    pub running: Option<ActiveRun>,
    pub watcher: Option<InstalledWatcher>,
    /// Generation handed to the most recently installed watcher.
    pub watch_generation: u64,
    pub reload_pending: bool,
    pub last_result: Option<TestResult>,
    pub next_run_id: u64,
}

impl fmt::Debug for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderState")
            .field("project", &self.project_path())
            .field(
                "loaded",
                &self.loaded.as_ref().map(|l| l.tree.full_name.as_str()),
            )
            .field("running", &self.running.as_ref().map(|r| r.run_id))
            .field("watching", &self.watcher.as_ref().map(|w| w.generation))
            .field("reload_pending", &self.reload_pending)
            .finish_non_exhaustive()
    }
}

impl LoaderState {
    pub fn project_path(&self) -> Option<PathBuf> {
        self.project.as_ref().map(|p| p.path().to_path_buf())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stop and drop the installed watcher, if any.
    pub fn remove_watcher(&mut self) {
        if let Some(mut installed) = self.watcher.take() {
            installed.watcher.stop();
        }
    }

    /// Clear the run if it is still the one identified by `run_id`.
    pub fn finish_run(&mut self, run_id: u64) -> bool {
        if self.running.as_ref().is_some_and(|r| r.run_id == run_id) {
            self.running = None;
            true
        } else {
            false
        }
    }
}

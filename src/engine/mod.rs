// src/engine/mod.rs

//! Test-session orchestration.
//!
//! The [`Orchestrator`] owns the current project, the loaded test tree and
//! its execution context, and the run/reload state. Three actors meet here:
//! - the caller, driving load/unload/run/cancel,
//! - the run worker ([`worker`]), executing one run in the background,
//! - the change watcher, whose notifications are folded into a reload or a
//!   pending-reload flag ([`reload`]).
//!
//! All state lives behind one async mutex in [`state`]; the worker and the
//! watcher only reach it through the orchestrator's own entry points.

use std::path::PathBuf;
use std::sync::Arc;

use crate::types::TestNode;

pub mod orchestrator;
pub mod reload;
pub mod state;
pub mod worker;

pub use orchestrator::{Collaborators, Orchestrator};

/// Behaviour read from settings at construction time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Install a change watcher over the active members after each load.
    pub reload_on_change: bool,
    /// Reload before every run, whether or not a change was seen.
    pub reload_on_run: bool,
}

/// Whether a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Point-in-time view of the orchestrator, for clients and tests.
#[derive(Debug, Clone)]
pub struct LoaderStatus {
    pub project_path: Option<PathBuf>,
    pub active_config: Option<String>,
    pub loaded_test: Option<Arc<TestNode>>,
    pub run_state: RunState,
    pub running_test: Option<Arc<TestNode>>,
    pub reload_pending: bool,
    pub has_last_result: bool,
}

/// A change reported by the installed watcher.
///
/// `generation` identifies the watcher that saw it; notices from a watcher
/// that has since been replaced or stopped are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub path: PathBuf,
    pub generation: u64,
}

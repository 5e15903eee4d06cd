// src/watch/mod.rs

//! Change watching for loaded test artifacts.
//!
//! - [`ChangeWatcher`] / [`WatcherFactory`] are the capability the
//!   orchestrator installs after a successful load.
//! - [`watcher`] implements it on top of `notify`, with a quiet-period
//!   debounce per path.
//! - [`hash`] and [`cache`] suppress notifications for files whose content
//!   did not actually change (e.g. a rebuild that produced identical bytes).

use std::path::PathBuf;
use std::sync::Arc;

pub mod cache;
pub mod hash;
pub mod watcher;

pub use cache::FileCache;
pub use hash::compute_file_hash;
pub use watcher::{NotifyWatcher, NotifyWatcherFactory, DEFAULT_WATCH_DELAY};

/// Callback invoked with one changed path per call, from the watcher's own
/// background task.
pub type ChangeCallback = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Observes a set of artifact paths.
pub trait ChangeWatcher: Send {
    /// Begin watching `paths`. Restarting replaces any previous watch.
    fn start(&mut self, paths: &[PathBuf], on_change: ChangeCallback) -> anyhow::Result<()>;

    /// Stop watching. No callback fires after this returns.
    fn stop(&mut self);
}

/// Produces unstarted watchers.
pub trait WatcherFactory: Send + Sync {
    fn create(&self) -> Box<dyn ChangeWatcher>;
}

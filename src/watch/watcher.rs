// src/watch/watcher.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{ChangeCallback, ChangeWatcher, WatcherFactory};
use crate::fs::FileSystem;
use crate::watch::cache::FileCache;

/// Quiet period a file must stay untouched before its change is reported.
pub const DEFAULT_WATCH_DELAY: Duration = Duration::from_millis(1000);

/// Builds [`NotifyWatcher`]s sharing one delay and filesystem.
#[derive(Debug, Clone)]
pub struct NotifyWatcherFactory {
    delay: Duration,
    fs: Arc<dyn FileSystem>,
}

impl NotifyWatcherFactory {
    pub fn new(delay: Duration, fs: Arc<dyn FileSystem>) -> Self {
        Self { delay, fs }
    }
}

impl WatcherFactory for NotifyWatcherFactory {
    fn create(&self) -> Box<dyn ChangeWatcher> {
        Box::new(NotifyWatcher::new(self.delay, Arc::clone(&self.fs)))
    }
}

/// Filesystem watcher over a set of artifact files.
///
/// The parent directory of each file is watched non-recursively and events
/// are filtered down to the watched files. A path is reported once it has
/// been quiet for `delay` and its content hash differs from the last one
/// seen. Dropping the watcher stops it.
pub struct NotifyWatcher {
    delay: Duration,
    fs: Arc<dyn FileSystem>,
    inner: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("delay", &self.delay)
            .field("running", &self.inner.is_some())
            .finish()
    }
}

impl NotifyWatcher {
    pub fn new(delay: Duration, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            delay,
            fs,
            inner: None,
            task: None,
        }
    }
}

impl ChangeWatcher for NotifyWatcher {
    fn start(&mut self, paths: &[PathBuf], on_change: ChangeCallback) -> Result<()> {
        self.stop();

        let watched: HashSet<PathBuf> = paths
            .iter()
            .map(|p| self.fs.canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();

        let mut cache = FileCache::new();
        for path in &watched {
            cache.record(self.fs.as_ref(), path);
        }

        // Channel from the blocking notify callback into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event_tx.send(event).is_err() {
                        debug!("watcher task gone; dropping notify event");
                    }
                }
                Err(err) => warn!(error = %err, "file watch error"),
            },
            Config::default(),
        )?;

        let dirs: HashSet<&Path> = watched.iter().filter_map(|p| p.parent()).collect();
        for dir in dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        info!(files = watched.len(), delay_ms = self.delay.as_millis() as u64, "change watcher started");

        let task = tokio::spawn(debounce_loop(
            event_rx,
            watched,
            cache,
            Arc::clone(&self.fs),
            self.delay,
            on_change,
        ));

        self.inner = Some(watcher);
        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        if self.inner.take().is_some() {
            debug!("change watcher stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for NotifyWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_content_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Collect raw notify events per watched path and report each path once it
/// has been quiet for `delay`.
async fn debounce_loop(
    mut events: mpsc::UnboundedReceiver<Event>,
    watched: HashSet<PathBuf>,
    mut cache: FileCache,
    fs: Arc<dyn FileSystem>,
    delay: Duration,
    on_change: ChangeCallback,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        let next_due = pending.values().min().copied();

        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !is_content_event(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if watched.contains(&path) {
                        debug!(?path, kind = ?event.kind, "watched file touched");
                        pending.insert(path, Instant::now() + delay);
                    }
                }
            }

            _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in due {
                    pending.remove(&path);
                    if cache.changed(fs.as_ref(), &path) {
                        info!(?path, "watched file changed");
                        on_change(path);
                    } else {
                        debug!(?path, "content unchanged; ignoring event");
                    }
                }
            }
        }
    }

    debug!("watcher event loop finished");
}

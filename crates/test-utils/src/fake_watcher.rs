use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use testloader::watch::{ChangeCallback, ChangeWatcher, WatcherFactory};

struct Slot {
    paths: Vec<PathBuf>,
    callback: ChangeCallback,
    active: bool,
}

/// Watchers whose change notifications are fired by the test.
#[derive(Clone, Default)]
pub struct ManualWatcherFactory {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl ManualWatcherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `path` as changed from every running watcher.
    pub fn trigger(&self, path: impl Into<PathBuf>) {
        self.fire(path.into(), true);
    }

    /// Report `path` from watchers that have already been stopped.
    pub fn trigger_stopped(&self, path: impl Into<PathBuf>) {
        self.fire(path.into(), false);
    }

    fn fire(&self, path: PathBuf, active: bool) {
        let callbacks: Vec<ChangeCallback> = self
            .slots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.active == active)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for cb in callbacks {
            cb(path.clone());
        }
    }

    pub fn started(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn active(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|s| s.active).count()
    }

    /// Paths given to the most recently started watcher.
    pub fn last_watched(&self) -> Vec<PathBuf> {
        self.slots
            .lock()
            .unwrap()
            .last()
            .map(|s| s.paths.clone())
            .unwrap_or_default()
    }
}

impl WatcherFactory for ManualWatcherFactory {
    fn create(&self) -> Box<dyn ChangeWatcher> {
        Box::new(ManualWatcher {
            slots: Arc::clone(&self.slots),
            index: None,
        })
    }
}

struct ManualWatcher {
    slots: Arc<Mutex<Vec<Slot>>>,
    index: Option<usize>,
}

impl ChangeWatcher for ManualWatcher {
    fn start(&mut self, paths: &[PathBuf], on_change: ChangeCallback) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().unwrap();
        slots.push(Slot {
            paths: paths.to_vec(),
            callback: on_change,
            active: true,
        });
        self.index = Some(slots.len() - 1);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(index) = self.index.take() {
            if let Some(slot) = self.slots.lock().unwrap().get_mut(index) {
                slot.active = false;
            }
        }
    }
}

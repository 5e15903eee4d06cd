// src/workdir.rs

//! Injectable "current resolution directory".
//!
//! Loading a test records the directory that relative paths inside the tests
//! should resolve against. This is kept per orchestrator instead of changing
//! the process-wide current directory, so several orchestrators can coexist
//! in one process. Execution contexts read it when they start work.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct WorkingDirectory {
    current: Arc<RwLock<Option<PathBuf>>>,
}

impl WorkingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<PathBuf> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref().to_path_buf();
        debug!(dir = %dir.display(), "resolution directory set");
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(dir);
    }

    pub fn clear(&self) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

// src/watch/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::watch::hash::compute_file_hash;

/// Last known content hash of each watched file.
#[derive(Debug, Default)]
pub struct FileCache {
    hashes: HashMap<PathBuf, String>,
}

impl FileCache {
    pub fn new() -> Self {
        Self {
            hashes: HashMap::new(),
        }
    }

    /// Record the current hash of `path` as the baseline.
    pub fn record(&mut self, fs: &dyn FileSystem, path: &Path) {
        match compute_file_hash(fs, path) {
            Ok(hash) => {
                self.hashes.insert(path.to_path_buf(), hash);
            }
            Err(err) => {
                debug!(?path, error = %err, "no baseline hash for watched file");
                self.hashes.remove(path);
            }
        }
    }

    /// Rehash `path` and report whether it differs from the recorded hash,
    /// updating the baseline.
    ///
    /// A file that cannot be hashed (e.g. deleted) counts as changed.
    pub fn changed(&mut self, fs: &dyn FileSystem, path: &Path) -> bool {
        match compute_file_hash(fs, path) {
            Ok(hash) => {
                let previous = self.hashes.insert(path.to_path_buf(), hash.clone());
                previous.as_deref() != Some(hash.as_str())
            }
            Err(err) => {
                warn!(?path, error = %err, "failed to hash changed file; reporting it anyway");
                self.hashes.remove(path);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

// src/project/loader.rs

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::errors::{LoaderError, Result};
use crate::fs::FileSystem;
use crate::project::model::{Project, RawProjectFile};

/// Extension that marks a path as a project file rather than a bare artifact.
pub const PROJECT_EXTENSION: &str = "toml";

/// Capability that turns a path into a [`Project`].
pub trait ProjectModel: Send + Sync {
    fn resolve(&self, path: &Path) -> anyhow::Result<Project>;
}

/// Resolves project files and bare artifacts from a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct FileProjectModel {
    fs: Arc<dyn FileSystem>,
}

impl FileProjectModel {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl ProjectModel for FileProjectModel {
    fn resolve(&self, path: &Path) -> anyhow::Result<Project> {
        if !self.fs.is_file(path) {
            bail!("no such file: {:?}", path);
        }
        let path = self.fs.canonicalize(path)?;

        if !is_project_file(&path) {
            return Ok(Project::wrap(path));
        }

        let contents = self.fs.read_to_string(&path)?;
        let project = parse_project(&path, &contents)
            .with_context(|| format!("parsing project file {:?}", path))?;
        Ok(project)
    }
}

pub fn is_project_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PROJECT_EXTENSION))
}

/// Parse and validate the TOML contents of a project file.
pub fn parse_project(path: &Path, contents: &str) -> Result<Project> {
    let raw: RawProjectFile = toml::from_str(contents)?;

    if let Some(active) = &raw.active_config {
        if !raw.config.contains_key(active) {
            return Err(LoaderError::ConfigError(format!(
                "active_config '{}' does not name a [config.<name>] section",
                active
            )));
        }
    }

    Ok(Project::new(path, raw.config, raw.active_config))
}

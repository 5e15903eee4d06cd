// src/project/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Name of the single configuration of a wrapper project.
pub const DEFAULT_CONFIG_NAME: &str = "Default";

/// A project file as read from TOML.
///
/// ```toml
/// active_config = "Debug"
///
/// [config.Debug]
/// base_path = "bin/Debug"
/// members = ["Core.Tests.dll", "Api.Tests.dll"]
///
/// [config.Release]
/// base_path = "bin/Release"
/// members = ["Core.Tests.dll"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawProjectFile {
    /// Configuration selected on load; the first one by name when absent.
    #[serde(default)]
    pub active_config: Option<String>,

    /// Named configurations from `[config.<name>]`.
    #[serde(default)]
    pub config: BTreeMap<String, ProjectConfig>,
}

/// `[config.<name>]` section: one resolution of the project into members.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct ProjectConfig {
    /// Directory the members are relative to, itself relative to the
    /// project file's directory.
    #[serde(default)]
    pub base_path: Option<PathBuf>,

    /// Test artifacts making up this configuration.
    #[serde(default)]
    pub members: Vec<PathBuf>,
}

/// A loadable unit: an artifact path plus its named configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    path: PathBuf,
    is_wrapper: bool,
    configs: BTreeMap<String, ProjectConfig>,
    active_config: Option<String>,
}

impl Project {
    pub fn new(
        path: impl Into<PathBuf>,
        configs: BTreeMap<String, ProjectConfig>,
        active_config: Option<String>,
    ) -> Self {
        let active_config = active_config.or_else(|| configs.keys().next().cloned());
        Self {
            path: path.into(),
            is_wrapper: false,
            configs,
            active_config,
        }
    }

    /// Wrap a bare test artifact as a project with one configuration whose
    /// only member is the artifact itself.
    pub fn wrap(artifact: impl Into<PathBuf>) -> Self {
        let artifact = artifact.into();
        let mut configs = BTreeMap::new();
        configs.insert(
            DEFAULT_CONFIG_NAME.to_string(),
            ProjectConfig {
                base_path: None,
                members: vec![artifact.clone()],
            },
        );
        Self {
            path: artifact,
            is_wrapper: true,
            configs,
            active_config: Some(DEFAULT_CONFIG_NAME.to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_wrapper(&self) -> bool {
        self.is_wrapper
    }

    pub fn config_names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn active_config_name(&self) -> Option<&str> {
        self.active_config.as_deref()
    }

    pub fn active_config(&self) -> Option<&ProjectConfig> {
        self.active_config
            .as_ref()
            .and_then(|name| self.configs.get(name))
    }

    /// Select a configuration. Unknown names are accepted and simply leave
    /// the project without a loadable configuration.
    pub fn set_active_config(&mut self, name: impl Into<String>) {
        self.active_config = Some(name.into());
    }

    /// True when the active configuration exists and has members.
    pub fn is_loadable(&self) -> bool {
        self.active_config()
            .is_some_and(|cfg| !cfg.members.is_empty())
    }

    /// Members of the active configuration, resolved to full paths.
    pub fn active_members(&self) -> Vec<PathBuf> {
        let Some(cfg) = self.active_config() else {
            return Vec::new();
        };

        let base = match &cfg.base_path {
            Some(base) => self.project_dir().join(base),
            None => self.project_dir(),
        };

        cfg.members
            .iter()
            .map(|member| {
                if member.is_absolute() {
                    member.clone()
                } else {
                    base.join(member)
                }
            })
            .collect()
    }

    /// Directory relative paths inside loaded tests resolve against.
    ///
    /// Wrapper projects use the artifact's own directory; otherwise the
    /// directory of the first active member.
    pub fn working_directory(&self) -> Option<PathBuf> {
        let anchor = if self.is_wrapper {
            Some(self.path.clone())
        } else {
            self.active_members().into_iter().next()
        };
        anchor.and_then(|p| p.parent().map(Path::to_path_buf))
    }

    fn project_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

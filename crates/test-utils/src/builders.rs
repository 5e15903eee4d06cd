#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::anyhow;
use testloader::project::{Project, ProjectConfig, ProjectModel};
use testloader::types::TestNode;

pub fn case(full_name: &str) -> TestNode {
    TestNode::case(full_name)
}

pub fn suite(full_name: &str, children: Vec<TestNode>) -> TestNode {
    TestNode::suite(full_name, children)
}

/// Builder for `Project` to simplify test setup.
pub struct ProjectBuilder {
    path: PathBuf,
    configs: BTreeMap<String, ProjectConfig>,
    active: Option<String>,
}

impl ProjectBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            configs: BTreeMap::new(),
            active: None,
        }
    }

    pub fn with_config(mut self, name: &str, members: &[&str]) -> Self {
        self.configs.insert(
            name.to_string(),
            ProjectConfig {
                base_path: None,
                members: members.iter().map(PathBuf::from).collect(),
            },
        );
        self
    }

    pub fn with_base_path(mut self, name: &str, base: &str) -> Self {
        if let Some(cfg) = self.configs.get_mut(name) {
            cfg.base_path = Some(PathBuf::from(base));
        }
        self
    }

    pub fn active(mut self, name: &str) -> Self {
        self.active = Some(name.to_string());
        self
    }

    pub fn build(self) -> Project {
        Project::new(self.path, self.configs, self.active)
    }
}

/// A `ProjectModel` that serves projects registered in memory.
///
/// Unregistered paths fail to resolve.
#[derive(Default)]
pub struct InMemoryProjects {
    projects: Mutex<HashMap<PathBuf, Project>>,
    resolved: Mutex<Vec<PathBuf>>,
}

impl InMemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, project: Project) -> Self {
        self.insert(project);
        self
    }

    pub fn insert(&self, project: Project) {
        self.projects
            .lock()
            .unwrap()
            .insert(project.path().to_path_buf(), project);
    }

    pub fn resolved(&self) -> Vec<PathBuf> {
        self.resolved.lock().unwrap().clone()
    }
}

impl ProjectModel for InMemoryProjects {
    fn resolve(&self, path: &Path) -> anyhow::Result<Project> {
        self.resolved.lock().unwrap().push(path.to_path_buf());
        self.projects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("unknown project {:?}", path))
    }
}

// src/project/mod.rs

//! Project model: which artifacts make up the tests to load.
//!
//! - [`model`] holds [`Project`] and its named configurations.
//! - [`loader`] provides the [`ProjectModel`] capability and the
//!   file-backed implementation used in production.

pub mod loader;
pub mod model;

pub use loader::{is_project_file, parse_project, FileProjectModel, ProjectModel, PROJECT_EXTENSION};
pub use model::{Project, ProjectConfig, RawProjectFile, DEFAULT_CONFIG_NAME};

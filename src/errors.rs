// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Collaborator failures (project model, execution context, watcher) arrive
//! as `anyhow::Error` and are wrapped into the matching variant here so that
//! failure events can carry a structured error.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("no project is loaded")]
    NoProjectLoaded,

    #[error("no test is loaded")]
    NoTestLoaded,

    #[error("failed to load project {path:?}: {source}")]
    ProjectLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("project {path:?} has no loadable configuration")]
    NotLoadable { path: PathBuf },

    #[error("failed to load tests from {path:?}: {source}")]
    TestLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("test run failed: {0}")]
    Run(#[source] anyhow::Error),

    #[error("test run was cancelled")]
    RunCancelled,

    #[error("failed to unload tests from {path:?}: {source}")]
    Unload {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to reload tests from {path:?}: {source}")]
    Reload {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LoaderError>;

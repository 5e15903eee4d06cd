// src/context/mod.rs

//! Execution context capability.
//!
//! An execution context owns exactly one loaded test tree and can load, run
//! and unload it. The orchestrator never assumes anything about how a
//! context isolates the tests beyond these three operations.
//!
//! - [`ExecutionContext`] / [`ContextFactory`] are the seams the
//!   orchestrator drives; tests plug in scripted fakes here.
//! - [`process`] is the production implementation, running an external
//!   engine as a child process.
//! - [`wire`] is the JSON protocol spoken by that engine.
//!
//! A run is cancelled by dropping its future. Implementations must reach an
//! `.await` often enough for that to take effect, and must not be reused
//! for another run after a cancelled one leaves state behind: the
//! orchestrator discards a context rather than repairing it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::events::OutputStream;
use crate::project::Project;
use crate::types::{TestNode, TestResult};

pub mod process;
pub mod wire;

pub use process::{EngineCommand, ProcessContext, ProcessContextFactory};

/// Boxed future returned by context operations.
pub type ContextFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Receives engine-level notifications while a run is in progress.
pub trait RunListener: Send + Sync {
    fn test_started(&self, case: &TestNode);
    fn test_finished(&self, result: &TestResult);
    fn suite_started(&self, suite: &TestNode);
    fn suite_finished(&self, result: &TestResult);

    /// Captured output from the tests. Ignored unless overridden.
    fn output(&self, _stream: OutputStream, _text: &str) {}
}

/// An isolated runtime able to load, run, and unload a test tree.
pub trait ExecutionContext: Send + Sync {
    /// Load the project's active configuration and return the test tree.
    fn load<'a>(&'a self, project: &'a Project) -> ContextFuture<'a, TestNode>;

    /// Run `node` from the loaded tree, reporting progress to `listener`.
    fn run<'a>(
        &'a self,
        node: &'a TestNode,
        listener: Arc<dyn RunListener>,
    ) -> ContextFuture<'a, TestResult>;

    /// Release everything the context holds.
    fn unload(&self) -> ContextFuture<'_, ()>;
}

/// Produces fresh, unloaded execution contexts.
pub trait ContextFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Arc<dyn ExecutionContext>>;
}

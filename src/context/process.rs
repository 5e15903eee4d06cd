// src/context/process.rs

//! Execution context backed by an external engine process.
//!
//! Every operation spawns the configured engine command with
//! `tokio::process::Command`. The child is spawned with `kill_on_drop`, so
//! cancelling a run (dropping its future) kills the engine process and
//! nothing of the run survives in this process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::wire::{self, EngineRecord, LIST_COMMAND, RUN_COMMAND, TEST_FLAG};
use super::{ContextFactory, ContextFuture, ExecutionContext, RunListener};
use crate::events::OutputStream;
use crate::project::Project;
use crate::types::{TestNode, TestResult};
use crate::workdir::WorkingDirectory;

/// Engine executable plus fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Creates a fresh [`ProcessContext`] per load.
#[derive(Debug, Clone)]
pub struct ProcessContextFactory {
    engine: EngineCommand,
    workdir: WorkingDirectory,
}

impl ProcessContextFactory {
    pub fn new(engine: EngineCommand, workdir: WorkingDirectory) -> Self {
        Self { engine, workdir }
    }
}

impl ContextFactory for ProcessContextFactory {
    fn create(&self) -> Result<Arc<dyn ExecutionContext>> {
        Ok(Arc::new(ProcessContext::new(
            self.engine.clone(),
            self.workdir.clone(),
        )))
    }
}

#[derive(Debug)]
pub struct ProcessContext {
    engine: EngineCommand,
    workdir: WorkingDirectory,
    /// Members of the loaded configuration; `None` before load and after unload.
    members: Mutex<Option<Vec<PathBuf>>>,
}

impl ProcessContext {
    pub fn new(engine: EngineCommand, workdir: WorkingDirectory) -> Self {
        Self {
            engine,
            workdir,
            members: Mutex::new(None),
        }
    }

    fn members(&self) -> MutexGuard<'_, Option<Vec<PathBuf>>> {
        self.members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.engine.program);
        cmd.args(&self.engine.args).arg(subcommand);
        if let Some(dir) = self.workdir.get().filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn load_inner(&self, project: &Project) -> Result<TestNode> {
        let members = project.active_members();
        if members.is_empty() {
            bail!("project {:?} has no active members", project.path());
        }

        info!(
            program = %self.engine.program,
            members = members.len(),
            "listing tests"
        );

        let mut cmd = self.command(LIST_COMMAND);
        cmd.args(&members);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("spawning test engine '{}'", self.engine.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "test engine exited with {} while listing tests: {}",
                output.status,
                stderr.trim()
            );
        }

        let tree = wire::parse_tree(&String::from_utf8_lossy(&output.stdout))?;
        debug!(root = %tree.full_name, tests = tree.test_count(), "engine listed tests");

        *self.members() = Some(members);
        Ok(tree)
    }

    async fn run_inner(&self, node: &TestNode, listener: Arc<dyn RunListener>) -> Result<TestResult> {
        let members = self
            .members()
            .clone()
            .ok_or_else(|| anyhow!("execution context is not loaded"))?;

        info!(test = %node.full_name, "starting engine run");

        let mut cmd = self.command(RUN_COMMAND);
        cmd.arg(TEST_FLAG).arg(&node.full_name).args(&members);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning test engine '{}'", self.engine.program))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("engine stdout was not captured"))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("engine stderr was not captured"))?;

        // Both pipes are read here so every line reaches the listener
        // before this run returns.
        let mut final_result = None;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut stderr_open = true;
        loop {
            let line = tokio::select! {
                line = out_lines.next_line() => {
                    EngineLine::Stdout(line.context("reading engine output")?)
                }
                line = err_lines.next_line(), if stderr_open => {
                    EngineLine::Stderr(line.unwrap_or_else(|err| {
                        warn!(error = %err, "failed to read engine stderr");
                        None
                    }))
                }
            };

            match line {
                EngineLine::Stdout(Some(line)) => match wire::parse_record(&line) {
                    Some(EngineRecord::SuiteStarted { node }) => listener.suite_started(&node),
                    Some(EngineRecord::TestStarted { node }) => listener.test_started(&node),
                    Some(EngineRecord::TestFinished { result }) => listener.test_finished(&result),
                    Some(EngineRecord::SuiteFinished { result }) => {
                        listener.suite_finished(&result)
                    }
                    Some(EngineRecord::RunFinished { result }) => final_result = Some(result),
                    None => listener.output(OutputStream::Stdout, &line),
                },
                EngineLine::Stdout(None) => break,
                EngineLine::Stderr(Some(line)) => listener.output(OutputStream::Stderr, &line),
                EngineLine::Stderr(None) => stderr_open = false,
            }
        }

        // Stdout closed first; relay what is left on stderr.
        while stderr_open {
            match err_lines.next_line().await {
                Ok(Some(line)) => listener.output(OutputStream::Stderr, &line),
                Ok(None) => stderr_open = false,
                Err(err) => {
                    warn!(error = %err, "failed to read engine stderr");
                    stderr_open = false;
                }
            }
        }

        let status = child.wait().await.context("waiting for test engine")?;
        info!(
            test = %node.full_name,
            exit_code = status.code().unwrap_or(-1),
            "engine run exited"
        );

        match final_result {
            Some(result) => Ok(result),
            None => bail!("test engine exited with {} without reporting a result", status),
        }
    }
}

/// One line read from either engine pipe; `None` marks end of stream.
enum EngineLine {
    Stdout(Option<String>),
    Stderr(Option<String>),
}

impl ExecutionContext for ProcessContext {
    fn load<'a>(&'a self, project: &'a Project) -> ContextFuture<'a, TestNode> {
        Box::pin(self.load_inner(project))
    }

    fn run<'a>(
        &'a self,
        node: &'a TestNode,
        listener: Arc<dyn RunListener>,
    ) -> ContextFuture<'a, TestResult> {
        Box::pin(self.run_inner(node, listener))
    }

    fn unload(&self) -> ContextFuture<'_, ()> {
        Box::pin(async move {
            if self.members().take().is_none() {
                warn!("unloading an execution context that was not loaded");
            }
            Ok(())
        })
    }
}

// src/context/wire.rs

//! Line protocol between [`ProcessContext`](super::ProcessContext) and an
//! external test engine.
//!
//! `list` prints the whole test tree as one JSON document:
//!
//! ```json
//! {"name":"Core","full_name":"Core","kind":"suite","children":[
//!   {"name":"Adds","full_name":"Core.Adds","kind":"case"}]}
//! ```
//!
//! `run` prints one JSON record per line, tagged by `event`:
//!
//! ```json
//! {"event":"suite_started","node":{"name":"Core","full_name":"Core","kind":"suite"}}
//! {"event":"test_started","node":{"name":"Adds","full_name":"Core.Adds","kind":"case"}}
//! {"event":"test_finished","result":{"full_name":"Core.Adds","kind":"case","outcome":"passed"}}
//! {"event":"suite_finished","result":{"full_name":"Core","kind":"suite","outcome":"passed"}}
//! {"event":"run_finished","result":{"full_name":"Core","kind":"suite","outcome":"passed"}}
//! ```
//!
//! Any other line is test output.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::types::{TestNode, TestResult};

/// Subcommand used to discover the test tree.
pub const LIST_COMMAND: &str = "list";
/// Subcommand used to run a node.
pub const RUN_COMMAND: &str = "run";
/// Flag naming the node to run.
pub const TEST_FLAG: &str = "--test";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineRecord {
    SuiteStarted { node: TestNode },
    TestStarted { node: TestNode },
    TestFinished { result: TestResult },
    SuiteFinished { result: TestResult },
    RunFinished { result: TestResult },
}

/// Parse one line of `run` output. Returns `None` for output lines.
pub fn parse_record(line: &str) -> Option<EngineRecord> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(error = %err, "line looks like JSON but is not a record; treating as output");
            None
        }
    }
}

/// Parse the output of `list`.
pub fn parse_tree(stdout: &str) -> Result<TestNode> {
    serde_json::from_str(stdout.trim()).context("parsing test tree from engine output")
}

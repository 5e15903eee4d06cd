// src/types.rs

//! Test tree and result types shared by the engine, contexts and clients.

use serde::{Deserialize, Serialize};

/// Whether a node is a single test case or a suite grouping other nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Case,
    Suite,
}

/// One element of a loaded test tree.
///
/// Trees are immutable snapshots taken at load time. The `full_name` is the
/// node's identity and is what a run is addressed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNode {
    pub name: String,
    pub full_name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub children: Vec<TestNode>,
}

impl TestNode {
    /// Build a test case. The short name is the last `.`-separated segment.
    pub fn case(full_name: impl Into<String>) -> Self {
        Self::new(full_name.into(), NodeKind::Case, Vec::new())
    }

    pub fn suite(full_name: impl Into<String>, children: Vec<TestNode>) -> Self {
        Self::new(full_name.into(), NodeKind::Suite, children)
    }

    fn new(full_name: String, kind: NodeKind, children: Vec<TestNode>) -> Self {
        let name = full_name
            .rsplit('.')
            .next()
            .unwrap_or(full_name.as_str())
            .to_string();
        Self {
            name,
            full_name,
            kind,
            description: None,
            ignored: false,
            children,
        }
    }

    pub fn is_suite(&self) -> bool {
        self.kind == NodeKind::Suite
    }

    /// Number of test cases at or below this node.
    pub fn test_count(&self) -> usize {
        match self.kind {
            NodeKind::Case => 1,
            NodeKind::Suite => self.children.iter().map(TestNode::test_count).sum(),
        }
    }

    /// Depth-first lookup by full name.
    pub fn find(&self, full_name: &str) -> Option<&TestNode> {
        if self.full_name == full_name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(full_name))
    }
}

/// Structural comparison used to decide whether a reload is observable.
///
/// Two trees are the same when every node matches by full name, kind and
/// ignored flag, with children in the same order. Descriptions are not
/// compared.
pub fn same_tree(a: &TestNode, b: &TestNode) -> bool {
    a.full_name == b.full_name
        && a.kind == b.kind
        && a.ignored == b.ignored
        && a.children.len() == b.children.len()
        && a.children
            .iter()
            .zip(b.children.iter())
            .all(|(x, y)| same_tree(x, y))
}

/// Outcome of a single case or an aggregated suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Ignored,
}

/// Result of running a case or a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub full_name: String,
    pub kind: NodeKind,
    pub outcome: Outcome,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub children: Vec<TestResult>,
}

/// Case counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub ignored: usize,
}

impl TestResult {
    pub fn passed(full_name: impl Into<String>) -> Self {
        Self::case(full_name.into(), Outcome::Passed, None)
    }

    pub fn failed(full_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::case(full_name.into(), Outcome::Failed, Some(message.into()))
    }

    pub fn ignored(full_name: impl Into<String>) -> Self {
        Self::case(full_name.into(), Outcome::Ignored, None)
    }

    fn case(full_name: String, outcome: Outcome, message: Option<String>) -> Self {
        Self {
            full_name,
            kind: NodeKind::Case,
            outcome,
            message,
            elapsed_ms: 0,
            children: Vec::new(),
        }
    }

    /// Aggregate child results into a suite result.
    ///
    /// A suite fails if any child failed, is ignored if it has children and
    /// all of them were ignored, and passes otherwise.
    pub fn suite(full_name: impl Into<String>, children: Vec<TestResult>) -> Self {
        let outcome = if children.iter().any(|c| c.outcome == Outcome::Failed) {
            Outcome::Failed
        } else if !children.is_empty() && children.iter().all(|c| c.outcome == Outcome::Ignored) {
            Outcome::Ignored
        } else {
            Outcome::Passed
        };
        let elapsed_ms = children.iter().map(|c| c.elapsed_ms).sum();
        Self {
            full_name: full_name.into(),
            kind: NodeKind::Suite,
            outcome,
            message: None,
            elapsed_ms,
            children,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome != Outcome::Failed
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        self.accumulate(&mut summary);
        summary
    }

    fn accumulate(&self, summary: &mut RunSummary) {
        match self.kind {
            NodeKind::Case => {
                summary.total += 1;
                match self.outcome {
                    Outcome::Passed => summary.passed += 1,
                    Outcome::Failed => summary.failed += 1,
                    Outcome::Ignored => summary.ignored += 1,
                }
            }
            NodeKind::Suite => {
                for child in &self.children {
                    child.accumulate(summary);
                }
            }
        }
    }
}

// src/report.rs

//! Plain-text console reporting for the CLI.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::events::{EventSubscriber, OutputStream, RunOutcome, TestEvent};
use crate::types::{NodeKind, Outcome, TestNode, TestResult};

/// Prints lifecycle and run events as they arrive.
///
/// Per-suite events are not printed; case results and the final summary
/// are enough for a terminal.
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    fn write_event(&self, out: &mut dyn Write, event: &TestEvent) -> io::Result<()> {
        match event {
            TestEvent::ProjectLoaded { path } => {
                writeln!(out, "project {}", path.display())?;
            }
            TestEvent::TestLoaded { path, tree } => {
                writeln!(
                    out,
                    "loaded {} test(s) from {}",
                    tree.test_count(),
                    path.display()
                )?;
            }
            TestEvent::TestReloaded { tree, .. } => {
                writeln!(out, "reloaded: {} test(s)", tree.test_count())?;
            }
            TestEvent::TestLoadFailed { error, .. } => {
                writeln!(out, "load failed: {error}")?;
            }
            TestEvent::TestReloadFailed { error, .. } => {
                writeln!(out, "reload failed: {error}")?;
            }
            TestEvent::TestUnloadFailed { error, .. } => {
                writeln!(out, "unload failed: {error}")?;
            }
            TestEvent::RunStarting { node } => {
                writeln!(out, "running {}", node.full_name)?;
            }
            TestEvent::TestFinished { result } => {
                write_case(out, result)?;
            }
            TestEvent::TestOutput { stream, text } => {
                let prefix = match stream {
                    OutputStream::Stdout => "",
                    OutputStream::Stderr => "[stderr] ",
                };
                writeln!(out, "{prefix}{}", text.trim_end_matches('\n'))?;
            }
            TestEvent::RunFinished { outcome } => match outcome {
                RunOutcome::Completed(result) => {
                    let s = result.summary();
                    writeln!(
                        out,
                        "{}: {} passed, {} failed, {} ignored ({} total, {} ms)",
                        if result.is_success() { "ok" } else { "FAILED" },
                        s.passed,
                        s.failed,
                        s.ignored,
                        s.total,
                        result.elapsed_ms
                    )?;
                }
                RunOutcome::Failed(_) if outcome.is_cancelled() => {
                    writeln!(out, "run cancelled")?;
                }
                RunOutcome::Failed(err) => {
                    writeln!(out, "run failed: {err}")?;
                }
            },
            _ => {}
        }
        Ok(())
    }
}

impl EventSubscriber for ConsoleReporter {
    fn on_event(&self, event: &TestEvent) -> anyhow::Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("console reporter writer poisoned"))?;
        self.write_event(out.as_mut(), event)?;
        out.flush()?;
        Ok(())
    }
}

fn write_case(out: &mut dyn Write, result: &TestResult) -> io::Result<()> {
    if result.kind == NodeKind::Suite {
        return Ok(());
    }
    let tag = match result.outcome {
        Outcome::Passed => "PASS",
        Outcome::Failed => "FAIL",
        Outcome::Ignored => "SKIP",
    };
    writeln!(out, "  {tag} {} ({} ms)", result.full_name, result.elapsed_ms)?;
    if let Some(message) = &result.message {
        for line in message.lines() {
            writeln!(out, "       {line}")?;
        }
    }
    Ok(())
}

/// Write `tree` as an indented outline, one node per line.
pub fn write_tree(out: &mut dyn Write, tree: &TestNode) -> io::Result<()> {
    write_node(out, tree, 0)
}

fn write_node(out: &mut dyn Write, node: &TestNode, depth: usize) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    let marker = if node.ignored { " (ignored)" } else { "" };
    if node.is_suite() {
        writeln!(
            out,
            "{indent}{} [{}]{marker}",
            node.full_name,
            node.test_count()
        )?;
    } else {
        writeln!(out, "{indent}{}{marker}", node.full_name)?;
    }
    for child in &node.children {
        write_node(out, child, depth + 1)?;
    }
    Ok(())
}

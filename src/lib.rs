// src/lib.rs

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fs;
pub mod logging;
pub mod project;
pub mod report;
pub mod types;
pub mod watch;
pub mod workdir;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{default_settings_path, load_and_validate, load_or_default, Settings};
use crate::context::ProcessContextFactory;
use crate::engine::{Collaborators, Orchestrator};
use crate::events::{TestEvent, RunOutcome};
use crate::fs::{FileSystem, RealFileSystem};
use crate::project::FileProjectModel;
use crate::report::{write_tree, ConsoleReporter};
use crate::watch::NotifyWatcherFactory;
use crate::workdir::WorkingDirectory;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading
/// - project model, process execution context and (with `--watch`) the
///   file watcher
/// - the orchestrator and a console reporter
/// - Ctrl-C handling
///
/// Returns whether the last run succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let settings = load_settings(&args)?;
    let engine = settings
        .engine()
        .ok_or_else(|| anyhow!("no [engine] command configured in the settings file"))?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let workdir = WorkingDirectory::new();

    let mut options = settings.orchestrator_options();
    // Without reload_on_change no watcher is installed, so nothing would
    // ever start a second run.
    let watch = args.watch && options.reload_on_change;
    if args.watch && !watch {
        warn!("--watch ignored: reload_on_change is disabled in the settings; running once");
    }
    // One-shot runs never observe a change.
    options.reload_on_change = watch;

    let collaborators = Collaborators::new(
        Arc::new(FileProjectModel::new(Arc::clone(&fs))),
        Arc::new(ProcessContextFactory::new(engine, workdir.clone())),
    )
    .with_workdir(workdir)
    .with_watchers(Arc::new(NotifyWatcherFactory::new(
        settings.watch_delay(),
        Arc::clone(&fs),
    )));

    let orchestrator = Orchestrator::new(collaborators, options);
    orchestrator
        .events()
        .subscribe(Arc::new(ConsoleReporter::stdout()));
    let mut events = orchestrator.events().subscribe_channel();

    orchestrator
        .load_project(&args.project)
        .await
        .with_context(|| format!("could not open {}", args.project))?;

    match &args.config {
        Some(name) => orchestrator.set_active_config(name).await?,
        None => orchestrator.load_test().await?,
    }

    let Some(tree) = orchestrator.loaded_test().await else {
        // The reporter already printed why.
        return Ok(false);
    };

    if args.list {
        let mut out = std::io::stdout();
        write_tree(&mut out, &tree)?;
        return Ok(true);
    }

    let target = args.test.clone().unwrap_or_else(|| tree.full_name.clone());
    if tree.find(&target).is_none() {
        return Err(anyhow!("no test or suite named '{target}' in {}", args.project));
    }

    let succeeded = drive_runs(&orchestrator, &mut events, &target, watch).await?;

    if let Err(err) = orchestrator.unload_project().await {
        debug!(error = %err, "nothing to unload at exit");
    }
    Ok(succeeded)
}

fn load_settings(args: &CliArgs) -> Result<Settings> {
    let settings = match &args.settings {
        Some(path) => load_and_validate(PathBuf::from(path))?,
        None => load_or_default(default_settings_path())?,
    };
    debug!(?settings, "settings loaded");
    Ok(settings)
}

/// Start a run of `target` and keep consuming events until it finishes.
///
/// With `watch`, a new run is started after every observable reload (or a
/// reload deferred by the previous run) until Ctrl-C.
async fn drive_runs(
    orchestrator: &Orchestrator,
    events: &mut mpsc::UnboundedReceiver<TestEvent>,
    target: &str,
    watch: bool,
) -> Result<bool> {
    let mut last_ok = false;
    start_run(orchestrator, target).await?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                info!("interrupted; cancelling any active run");
                orchestrator.cancel_test_run().await;
                return Ok(last_ok && watch);
            }

            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(last_ok);
                };
                match event {
                    TestEvent::RunFinished { outcome } => {
                        last_ok = matches!(&outcome, RunOutcome::Completed(r) if r.is_success());
                        if !watch {
                            return Ok(last_ok);
                        }
                        if orchestrator.is_reload_pending().await {
                            start_run(orchestrator, target).await?;
                        }
                    }
                    TestEvent::TestReloaded { .. } if watch => {
                        if !orchestrator.is_test_running().await {
                            start_run(orchestrator, target).await?;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn start_run(orchestrator: &Orchestrator, target: &str) -> Result<()> {
    let tree = orchestrator
        .loaded_test()
        .await
        .ok_or_else(|| anyhow!("tests are no longer loaded"))?;
    let node = tree
        .find(target)
        .ok_or_else(|| anyhow!("'{target}' disappeared from the reloaded tree"))?;
    orchestrator.run_test_suite(node).await?;
    Ok(())
}

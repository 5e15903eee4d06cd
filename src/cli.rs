// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `testloader`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "testloader",
    version,
    about = "Load a test project, run its tests and reload them when they change.",
    long_about = None
)]
pub struct CliArgs {
    /// Project file (`*.toml`) or a test artifact to wrap as a project.
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Configuration of the project to activate before loading.
    #[arg(long, value_name = "NAME")]
    pub config: Option<String>,

    /// Full name of the test or suite to run. Defaults to the whole tree.
    #[arg(long, value_name = "FULL_NAME")]
    pub test: Option<String>,

    /// Path to the settings file (TOML).
    ///
    /// Default: `Testloader.toml` in the current working directory. A
    /// missing default file means built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<String>,

    /// Print the loaded test tree instead of running it.
    #[arg(long)]
    pub list: bool,

    /// Keep running: re-run after every reload until Ctrl-C.
    #[arg(long)]
    pub watch: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESTLOADER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

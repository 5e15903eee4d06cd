// src/config/model.rs

use serde::Deserialize;

use crate::context::EngineCommand;
use crate::engine::OrchestratorOptions;

/// Settings as read from a TOML file.
///
/// ```toml
/// [options]
/// reload_on_change = true
/// reload_on_run = false
/// watch_delay_ms = 1000
///
/// [engine]
/// command = "my-test-engine"
/// args = ["--quiet"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSettings {
    #[serde(default)]
    pub options: OptionsSection,

    #[serde(default)]
    pub engine: Option<EngineSection>,
}

/// `[options]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionsSection {
    /// Watch the loaded artifacts and reload when they change.
    #[serde(default = "default_reload_on_change")]
    pub reload_on_change: bool,

    /// Reload before every run, changed or not.
    #[serde(default)]
    pub reload_on_run: bool,

    /// Quiet period before a file change is reported.
    #[serde(default = "default_watch_delay_ms")]
    pub watch_delay_ms: u64,
}

fn default_reload_on_change() -> bool {
    true
}

fn default_watch_delay_ms() -> u64 {
    1000
}

impl Default for OptionsSection {
    fn default() -> Self {
        Self {
            reload_on_change: default_reload_on_change(),
            reload_on_run: false,
            watch_delay_ms: default_watch_delay_ms(),
        }
    }
}

/// `[engine]` section: the external test engine used by process contexts.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Validated settings.
///
/// Construct via `Settings::try_from(raw)` or the loader functions.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    options: OptionsSection,
    engine: Option<EngineSection>,
}

impl Settings {
    pub(crate) fn new_unchecked(options: OptionsSection, engine: Option<EngineSection>) -> Self {
        Self { options, engine }
    }

    pub fn options(&self) -> &OptionsSection {
        &self.options
    }

    pub fn engine(&self) -> Option<EngineCommand> {
        self.engine
            .as_ref()
            .map(|e| EngineCommand::new(e.command.trim(), e.args.clone()))
    }

    pub fn watch_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.options.watch_delay_ms)
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            reload_on_change: self.options.reload_on_change,
            reload_on_run: self.options.reload_on_run,
        }
    }
}

// src/config/mod.rs

//! Settings loading and validation for testloader.
//!
//! Settings are only ever read:
//! - `model.rs` defines the TOML-backed data model.
//! - `loader.rs` loads a settings file from disk.
//! - `validate.rs` checks the values before they reach the orchestrator.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_settings_path, load_and_validate, load_from_path, load_or_default};
pub use model::{EngineSection, OptionsSection, RawSettings, Settings};
pub use validate::validate_settings;

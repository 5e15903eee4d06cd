// src/config/validate.rs

use crate::config::model::{RawSettings, Settings};
use crate::errors::{LoaderError, Result};

impl TryFrom<RawSettings> for Settings {
    type Error = crate::errors::LoaderError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        validate_settings(&raw)?;
        Ok(Settings::new_unchecked(raw.options, raw.engine))
    }
}

pub fn validate_settings(raw: &RawSettings) -> Result<()> {
    validate_options(raw)?;
    validate_engine(raw)?;
    Ok(())
}

fn validate_options(raw: &RawSettings) -> Result<()> {
    if raw.options.reload_on_change && raw.options.watch_delay_ms == 0 {
        return Err(LoaderError::ConfigError(
            "[options].watch_delay_ms must be >= 1 when reload_on_change is enabled (got 0)"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(raw: &RawSettings) -> Result<()> {
    if let Some(engine) = &raw.engine {
        if engine.command.trim().is_empty() {
            return Err(LoaderError::ConfigError(
                "[engine].command must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

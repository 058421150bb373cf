//! Startup configuration.
//!
//! Credentials come from the process environment, optionally pre-loaded from
//! a local `key=value` file. Values already present in the environment win
//! over the file. Pipeline tuning lives in [`Settings`], read from an
//! optional TOML file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::knowledge::UnitSystem;
use crate::nlu::DEFAULT_ENTITY_PATH;

pub const SLACK_BOT_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";
pub const SLACK_APP_TOKEN_ENV: &str = "SLACK_APP_TOKEN";
pub const WIT_AI_TOKEN_ENV: &str = "WIT_AI_TOKEN";
pub const WOLFRAM_APP_ID_ENV: &str = "WOLFRAM_APP_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required credential: {0}")]
    MissingCredential(&'static str),

    #[error("Failed to load env file {path}: {message}")]
    EnvFile { path: PathBuf, message: String },

    #[error("Failed to read settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Pre-load `key=value` pairs from `path` into the environment.
///
/// Returns `Ok(false)` when the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            info!("[Config] Loaded environment from {}", path.display());
            Ok(true)
        }
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("[Config] No env file at {}", path.display());
            Ok(false)
        }
        Err(e) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}

/// The four secrets the bot cannot start without.
#[derive(Clone)]
pub struct Credentials {
    pub slack_bot_token: String,
    pub slack_app_token: String,
    pub wit_ai_token: String,
    pub wolfram_app_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("slack_bot_token", &"<redacted>")
            .field("slack_app_token", &"<redacted>")
            .field("wit_ai_token", &"<redacted>")
            .field("wolfram_app_id", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolve every credential through `lookup`. Blank values count as missing.
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            slack_bot_token: required(&lookup, SLACK_BOT_TOKEN_ENV)?,
            slack_app_token: required(&lookup, SLACK_APP_TOKEN_ENV)?,
            wit_ai_token: required(&lookup, WIT_AI_TOKEN_ENV)?,
            wolfram_app_id: required(&lookup, WOLFRAM_APP_ID_ENV)?,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingCredential(name)),
    }
}

/// Non-secret pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path of the refined search query inside the serialized NLU result
    pub entity_path: String,
    pub units: UnitSystem,
    /// Cap on spoken answers, in characters
    pub spoken_max_chars: usize,
    /// Report section rendered by the full-report formatter
    pub primary_section: usize,
    /// Capacity of the command event queue; oldest events are dropped on overflow
    pub event_buffer: usize,
    pub wit_api_version: String,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            entity_path: DEFAULT_ENTITY_PATH.to_string(),
            units: UnitSystem::Metric,
            spoken_max_chars: 1000,
            primary_section: 1,
            event_buffer: 256,
            wit_api_version: "20240304".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Read settings from a TOML file. Absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            toml::from_str(&content).map_err(|source| ConfigError::SettingsParse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_path.trim().is_empty() {
            return Err(ConfigError::Invalid("entity_path must not be empty".to_string()));
        }
        if self.spoken_max_chars == 0 {
            return Err(ConfigError::Invalid(
                "spoken_max_chars must be greater than zero".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        if self.wit_api_version.trim().is_empty() {
            return Err(ConfigError::Invalid("wit_api_version must not be empty".to_string()));
        }
        Ok(())
    }
}

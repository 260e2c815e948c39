//! Configuration management for copilot-mcp
//!
//! Settings come from an optional JSON file and are then overridden by
//! environment variables. Every field has a default, so a missing file is
//! not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::paths::Paths;

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "COPILOT_MCP_CONFIG";

/// Configuration errors (fatal at startup)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// copilot-mcp configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Assistant executable, looked up on PATH
    #[serde(default = "default_assistant_command")]
    pub assistant_command: String,

    /// Directory the assistant is scoped to (defaults to the process cwd)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Per-invocation deadline in seconds; unset or 0 waits for process exit
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Directory with `<tool>.description.md` / `<tool>.template.md` overrides
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,

    /// Preferred log directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log verbosity (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_assistant_command() -> String {
    "copilot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant_command: default_assistant_command(),
            working_dir: None,
            timeout_secs: None,
            prompts_dir: None,
            log_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config file (COPILOT_MCP_CONFIG or the default location)
    /// and apply environment overrides
    pub fn from_env(paths: &Paths) -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.config_file());

        let mut config = Self::load(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(command) = get("COPILOT_BIN") {
            self.assistant_command = command;
        }
        if let Some(dir) = get("COPILOT_MCP_PROMPTS_DIR") {
            self.prompts_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(raw) = get("COPILOT_MCP_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "COPILOT_MCP_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            self.timeout_secs = Some(secs);
        }

        Ok(())
    }

    /// Invocation deadline, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Log directory to try first
    pub fn log_dir(&self, paths: &Paths) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| paths.logs.clone())
    }
}

//! Client configuration
//!
//! Settings are read from `modvote.toml` in the platform config directory,
//! from the path in `MODVOTE_CONFIG`, or from an explicit path. A missing
//! file yields the defaults.
//!
//! ```toml
//! log_filter = "info,modvote_sync=debug"
//! max_nickname_len = 24
//! room_code_len = 6
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! max_delay_ms = 10000
//! backoff_factor = 2.0
//! retryable_kinds = ["unavailable", "timeout"]
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::models::{DEFAULT_MAX_NICKNAME_LEN, DEFAULT_ROOM_CODE_LEN};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "MODVOTE_CONFIG";

const CONFIG_FILE: &str = "modvote.toml";

/// Top-level client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default tracing filter directive (`RUST_LOG` takes precedence)
    pub log_filter: String,
    pub max_nickname_len: usize,
    pub room_code_len: usize,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            max_nickname_len: DEFAULT_MAX_NICKNAME_LEN,
            room_code_len: DEFAULT_ROOM_CODE_LEN,
            retry: RetrySettings::default(),
        }
    }
}

/// Retry policy for backend calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            retryable_kinds: vec![
                ErrorKind::NetworkRequestFailed,
                ErrorKind::Timeout,
                ErrorKind::Unavailable,
                ErrorKind::DeadlineExceeded,
                ErrorKind::ResourceExhausted,
                ErrorKind::Internal,
                ErrorKind::Aborted,
            ],
        }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from `path`, falling back to `MODVOTE_CONFIG` and then
    /// the platform config directory
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(Self::default_path),
        };

        match path {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading settings");
                Self::from_toml(&std::fs::read_to_string(&path)?)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `modvote.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "onyx", "modvote").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    fn check(&self) -> Result<()> {
        if self.max_nickname_len == 0 {
            return Err(Error::Config("max_nickname_len must be positive".into()));
        }
        if self.room_code_len < 4 {
            return Err(Error::Config("room_code_len must be at least 4".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be positive".into()));
        }
        if !(self.retry.backoff_factor.is_finite() && self.retry.backoff_factor >= 1.0) {
            return Err(Error::Config("retry.backoff_factor must be >= 1".into()));
        }
        Ok(())
    }
}

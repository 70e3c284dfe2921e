//! Policy configuration for tether.
//!
//! Reads `~/.tether/config.toml`, or the file named by `TETHER_CONFIG`. Every
//! section is optional; a missing section means the caller keeps its own
//! defaults. Durations are integer milliseconds (`*_ms` keys) and every policy
//! is validated while parsing, so a loaded [`TetherConfig`] only holds usable
//! policies.
//!
//! ```toml
//! [retry]
//! max_attempts = 5
//! initial_delay_ms = 250
//!
//! [rate_limit]
//! max_calls = 10
//! window_ms = 1000
//! ```
//!
//! `${VAR}` references anywhere in the file are replaced with the variable's
//! value (empty if unset) before parsing.

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;
use tether_types::{
    BatchOptions, DebounceOptions, MemoOptions, PartialSuccessOptions, RateLimitPolicy,
    RetryPolicy, ThrottleOptions, TimeoutPolicy,
};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "TETHER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    pub retry: Option<RetryPolicy>,
    pub partial: Option<PartialSuccessOptions>,
    pub timeout: Option<TimeoutPolicy>,
    pub rate_limit: Option<RateLimitPolicy>,
    pub debounce: Option<DebounceOptions>,
    pub throttle: Option<ThrottleOptions>,
    pub batch: Option<BatchOptions>,
    pub memo: Option<MemoOptions>,
}

impl TetherConfig {
    /// Load from [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file");
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Parse config text, expanding `${VAR}` references first.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(&expand_env_vars(content))
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Retry policy from the file, or the built-in default.
    #[must_use]
    pub fn retry_or_default(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn batch_or_default(&self) -> BatchOptions {
        self.batch.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn memo_or_default(&self) -> MemoOptions {
        self.memo.clone().unwrap_or_default()
    }
}

/// Replace `${VAR}` with the value of `VAR`, or nothing when unset.
/// An unterminated `${` is kept as written.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end_rel];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }

    out.push_str(rest);
    out
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".tether").join("config.toml"))
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a finished generation treats the active thread when something else
/// moved it while the generator was running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// The latest completion always becomes the tip.
    #[default]
    LastWriteWins,
    /// A completion only becomes the tip if the active thread is unchanged
    /// since its generation started. The node is stored either way.
    RejectStale,
}

impl FromStr for SelectionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_write_wins" => Ok(Self::LastWriteWins),
            "reject_stale" => Ok(Self::RejectStale),
            other => Err(ConfigError::InvalidValue {
                key: ENV_SELECTION_POLICY,
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastWriteWins => f.write_str("last_write_wins"),
            Self::RejectStale => f.write_str("reject_stale"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

const ENV_MODEL: &str = "CHAT_TREE_MODEL";
const ENV_SYSTEM_PROMPT: &str = "CHAT_TREE_SYSTEM_PROMPT";
const ENV_SELECTION_POLICY: &str = "CHAT_TREE_SELECTION_POLICY";
const ENV_GENERATION_TIMEOUT: &str = "CHAT_TREE_GENERATION_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ConversationConfig {
    /// Model override passed to the generator.
    pub model: Option<String>,
    /// Becomes the root node of every new conversation when set.
    pub system_prompt: Option<String>,
    pub selection_policy: SelectionPolicy,
    pub generation_timeout_secs: Option<u64>,
}

impl ConversationConfig {
    /// Defaults, then the TOML file at `path` (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL) {
            self.model = non_empty(model);
        }
        if let Some(prompt) = lookup(ENV_SYSTEM_PROMPT) {
            self.system_prompt = non_empty(prompt);
        }
        if let Some(policy) = lookup(ENV_SELECTION_POLICY) {
            self.selection_policy = policy.parse()?;
        }
        if let Some(timeout) = lookup(ENV_GENERATION_TIMEOUT) {
            let trimmed = timeout.trim();
            self.generation_timeout_secs = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_GENERATION_TIMEOUT,
                    value: timeout.clone(),
                })?)
            };
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

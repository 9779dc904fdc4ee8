//! Executor configuration (TOML)
//!
//! ```toml
//! thread_name = "host-a"
//! cancel_on_abort = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings for one [`SingleThreadExecutor`](crate::SingleThreadExecutor)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Name given to the worker thread by `spawn_worker`
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Cancel every queued handle on `stop(false)` instead of leaving them
    /// pending forever
    #[serde(default)]
    pub cancel_on_abort: bool,
}

fn default_thread_name() -> String {
    "hostloop-worker".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            cancel_on_abort: false,
        }
    }
}

impl ExecutorConfig {
    /// Config with a custom worker thread name
    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            ..Self::default()
        }
    }

    /// Parse a config from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a config from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ExecutorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.is_empty() {
            return Err(ConfigError::Invalid(
                "thread_name cannot be empty".to_string(),
            ));
        }
        // Thread names are passed to the OS as C strings
        if self.thread_name.contains('\0') {
            return Err(ConfigError::Invalid(format!(
                "thread_name contains a NUL byte: {:?}",
                self.thread_name
            )));
        }
        Ok(())
    }
}

// Author: Lukas Bower
// Purpose: Runtime limits for the link monitor pool and poll registry, loaded from TOML.

//! Stack configuration.
//!
//! Pools are sized at compile time; the values here only lower the usable
//! share of them at runtime. Every field has a default so an empty document
//! is a valid configuration.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::link::DEFAULT_LINK_CAPACITY;
use crate::poll::DEFAULT_POLL_CAPACITY;

/// Errors produced while loading a [`StackConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The document is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A limit was set to a value the stack cannot run with.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Limits applied to the link monitor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Maximum number of concurrently active link monitors.
    pub max_monitors: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_monitors: DEFAULT_LINK_CAPACITY,
        }
    }
}

/// Limits applied to the poll registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Maximum number of services registered with the scheduler.
    pub max_services: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_services: DEFAULT_POLL_CAPACITY,
        }
    }
}

/// Top-level stack configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Link monitor limits.
    pub link: LinkConfig,
    /// Poll registry limits.
    pub poll: PollConfig,
}

impl StackConfig {
    /// Parse and validate a configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject limits that would leave the stack unable to monitor anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.max_monitors == 0 {
            return Err(ConfigError::Invalid("link.max_monitors must be non-zero"));
        }
        if self.poll.max_services == 0 {
            return Err(ConfigError::Invalid("poll.max_services must be non-zero"));
        }
        Ok(())
    }
}

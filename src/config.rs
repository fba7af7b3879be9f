//! Startup configuration, read from the file given with `--config`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Shell settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Prompt printed before each line.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Replacement for `PATH` when resolving external commands.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_prompt() -> String {
    "$> ".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            path: None,
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("open config file \"{}\" failed", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("parse config file \"{}\" failed", path.display()))?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

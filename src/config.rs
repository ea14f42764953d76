use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::MAX_DECOMPRESS_BYTES;
use crate::engine::EngineOptions;
use crate::pattern::{self, Pattern};
use crate::search::BUFFER_SIZE;

/// Contents of the YAML pattern file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub backup: bool,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_max_decompress_bytes")]
    pub max_decompress_bytes: u64,
    pub patterns: Vec<Pattern>,
}

fn default_buffer_size() -> usize {
    BUFFER_SIZE
}

fn default_max_decompress_bytes() -> u64 {
    MAX_DECOMPRESS_BYTES
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(text).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            bail!("No patterns configured");
        }
        if self.buffer_size == 0 {
            bail!("bufferSize must be greater than zero");
        }
        pattern::validate_all(&self.patterns)?;
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            buffer_size: self.buffer_size,
            max_decompress_bytes: self.max_decompress_bytes,
            backup: self.backup,
        }
    }
}

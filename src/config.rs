use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::{DEFAULT_MAX_BUFFER, DEFAULT_READ_SIZE};
use crate::engine::EngineOptions;
use crate::format::FormatDescriptor;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_read_size")]
    pub read_size: usize,
    #[serde(default = "default_max_buffer")]
    pub max_buffer_bytes: usize,
    pub default_format: String,
    pub formats: Vec<FormatDescriptor>,
}

fn default_read_size() -> usize {
    DEFAULT_READ_SIZE
}

fn default_max_buffer() -> usize {
    DEFAULT_MAX_BUFFER
}

impl Config {
    pub fn format(&self, id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.id == id)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            read_size: self.read_size,
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.read_size == 0 {
            bail!("read_size must be positive");
        }
        if self.max_buffer_bytes < self.read_size {
            bail!(
                "max_buffer_bytes {} is smaller than read_size {}",
                self.max_buffer_bytes,
                self.read_size
            );
        }
        let mut seen = HashSet::new();
        for format in &self.formats {
            if !seen.insert(format.id.as_str()) {
                bail!("duplicate format id {}", format.id);
            }
            format
                .validate()
                .with_context(|| format!("format {}", format.id))?;
        }
        if self.format(&self.default_format).is_none() {
            bail!("default_format {} is not defined", self.default_format);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let config: Config = serde_yaml::from_slice(&bytes).context("parsing config yaml")?;
    config.validate()?;

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

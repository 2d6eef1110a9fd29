use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Sizing of one paged sequence store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// A page is sealed once it holds this many record bytes.
    pub page_size_bytes: usize,
    /// Resident page budget; pages beyond it are spilled least-recently-used first.
    pub memory_limit_bytes: usize,
    /// Where spill files go. Defaults to the system temp dir.
    #[serde(default)]
    pub spill_dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(page_size_bytes: usize, memory_limit_bytes: usize) -> Self {
        Self {
            page_size_bytes,
            memory_limit_bytes,
            spill_dir: None,
        }
    }

    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    pub fn validate(&self, label: &str) -> anyhow::Result<()> {
        if self.page_size_bytes == 0 {
            bail!("{label}.page_size_bytes must be > 0");
        }
        if self.memory_limit_bytes < self.page_size_bytes {
            bail!("{label}.memory_limit_bytes must be >= page_size_bytes");
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size_bytes: 64 * 1024,
            memory_limit_bytes: 64 * 1024 * 1024,
            spill_dir: None,
        }
    }
}

/// Engine-wide knobs: one store config for raw partition rows and one for frame entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub input_buffer: StoreConfig,
    #[serde(default)]
    pub frame_buffer: StoreConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.input_buffer.validate("input_buffer")?;
        self.frame_buffer.validate("frame_buffer")?;
        Ok(())
    }

    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(s).context("parsing engine config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = serde_json::from_str(s).context("parsing engine config json")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            other => bail!("unsupported engine config extension: {other:?}"),
        }
    }
}

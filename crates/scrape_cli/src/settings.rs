//! Optional RON settings file. Absent fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use scrape_core::{QueueConfig, ScrapeMode, DEFAULT_SCRAPE_TIMEOUT_MS};
use scrape_engine::EngineConfig;
use scrape_logging::scrape_info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub queue: QueueConfig,
    pub mode: ScrapeMode,
    /// Single-URL scrape timeout; bulk jobs use `queue.timeoutMs`.
    pub timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            queue: QueueConfig::default(),
            mode: ScrapeMode::default(),
            timeout_ms: DEFAULT_SCRAPE_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

pub fn load(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = ron::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    scrape_info!("Loaded settings from {:?}", path);
    Ok(settings)
}

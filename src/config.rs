use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ClipforgeError, Result};

/// Resolved runtime settings.
///
/// Values are layered once at startup: built-in defaults, then the config
/// file, then `CLIPFORGE_*` environment variables. The pipeline components
/// receive these as plain parameters and never consult the environment
/// themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transcoder executable, by name (resolved via PATH) or absolute path.
    pub ffmpeg: PathBuf,
    /// Prober executable.
    pub ffprobe: PathBuf,
    /// Directory for staged chunk artifacts.
    pub temp_dir: PathBuf,
    /// Chunk window size in seconds.
    pub chunk_secs: f64,
    /// Concurrent extraction limit.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            temp_dir: std::env::temp_dir().join("clipforge"),
            chunk_secs: 30.0,
            concurrency: 1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(path) = std::env::var("CLIPFORGE_FFMPEG") {
            config.ffmpeg = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CLIPFORGE_FFPROBE") {
            config.ffprobe = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CLIPFORGE_TEMP_DIR") {
            config.temp_dir = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("CLIPFORGE_CHUNK_SECS") {
            if let Ok(s) = secs.parse() {
                config.chunk_secs = s;
            }
        }
        if let Ok(concurrency) = std::env::var("CLIPFORGE_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                config.concurrency = c;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.chunk_secs.is_finite() || self.chunk_secs <= 0.0 {
            return Err(ClipforgeError::Config(
                "Chunk duration must be a positive number of seconds".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ClipforgeError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.ffmpeg.as_os_str().is_empty() || self.ffprobe.as_os_str().is_empty() {
            return Err(ClipforgeError::Config(
                "Tool paths must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("clipforge").join("config.toml"))
    }
}

pub mod chunk;
pub mod extract;
pub mod probe;
pub mod stage;

pub use chunk::{plan_windows, ChunkScheduler, SchedulerConfig};
pub use extract::{Extractor, FfmpegExtractor};
pub use probe::MediaProbe;
pub use stage::materialize;

use std::path::{Path, PathBuf};

use crate::error::{ClipforgeError, Result};

/// Container extensions the pipeline accepts as input.
const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv"];

/// A validated handle on the input file.
///
/// Existence and container format are checked once, before any extraction
/// starts. The handle is immutable after that.
#[derive(Debug, Clone)]
pub struct SourceMedia {
    path: PathBuf,
}

impl SourceMedia {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.is_file() {
            return Err(ClipforgeError::FileNotFound(path.display().to_string()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ClipforgeError::UnsupportedMedia(format!(
                "{} (supported: {})",
                path.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Stream metadata reported by the probe.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// Total duration in seconds.
    pub duration_secs: f64,
    pub has_audio: bool,
    pub has_video: bool,
    /// Container format name, when the tool reports one.
    pub format_name: Option<String>,
}

/// One time window of the source, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkWindow {
    /// Zero-based ordinal; equals the window's position in the plan.
    pub index: usize,
    /// Offset from the start of the source.
    pub start: f64,
    /// Always > 0; equals the configured chunk size except possibly for the
    /// final window, which is truncated to the remaining duration.
    pub duration: f64,
}

impl ChunkWindow {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A staged audio chunk: one window of the source, extracted to a workspace
/// file and read back into memory for handoff.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub window: ChunkWindow,
    /// Artifact on disk, owned by the workspace until released.
    pub path: PathBuf,
    /// Byte content of the artifact; empty until materialized.
    pub payload: Vec<u8>,
}

impl AudioChunk {
    pub fn index(&self) -> usize {
        self.window.index
    }
}

/// Expected on-disk size of a 16-bit mono 16 kHz WAV of the given duration.
pub fn estimate_wav_size(duration_secs: f64) -> usize {
    const SAMPLE_RATE: usize = 16000;
    const BYTES_PER_SAMPLE: usize = 2;
    const WAV_HEADER_SIZE: usize = 44;

    let samples = (duration_secs * SAMPLE_RATE as f64) as usize;
    WAV_HEADER_SIZE + samples * BYTES_PER_SAMPLE
}

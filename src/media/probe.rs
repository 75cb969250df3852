use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClipforgeError, Result};

use super::MediaInfo;

/// Queries a source file for duration and stream layout via ffprobe.
///
/// The tool location is injected by the caller; the probe never consults
/// `PATH` conventions or environment variables on its own.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    ffprobe: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

impl MediaProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Run the tool in metadata-only mode and parse the result.
    ///
    /// Fatal for the whole run on failure: without a duration there is
    /// nothing to schedule against.
    pub async fn probe(&self, source: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(source)
            .output()
            .await
            .map_err(|e| {
                ClipforgeError::Probe(format!("failed to run {}: {e}", self.ffprobe.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipforgeError::Probe(format!(
                "{} exited with {}: {}",
                self.ffprobe.display(),
                output.status,
                stderr.trim()
            )));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| ClipforgeError::Probe(format!("unparseable probe output: {e}")))?;

        let format = parsed
            .format
            .ok_or_else(|| ClipforgeError::Probe("probe output has no format section".into()))?;

        let duration_secs = format
            .duration
            .as_deref()
            .ok_or_else(|| ClipforgeError::Probe("probe output has no duration".into()))?
            .trim()
            .parse::<f64>()
            .map_err(|e| ClipforgeError::Probe(format!("unparseable duration: {e}")))?;

        let has_audio = parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));
        let has_video = parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("video"));

        debug!(
            "Probed {}: {:.2}s, audio={}, video={}",
            source.display(),
            duration_secs,
            has_audio,
            has_video
        );

        Ok(MediaInfo {
            duration_secs,
            has_audio,
            has_video,
            format_name: format.format_name,
        })
    }
}

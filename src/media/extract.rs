use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClipforgeError, Result};

use super::ChunkWindow;

/// Normalization target for staged audio: what speech APIs expect.
pub const TARGET_SAMPLE_RATE: u32 = 16000;
pub const TARGET_CHANNELS: u16 = 1;
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;

/// Produces normalized audio artifacts for time windows of a source.
///
/// The scheduler is written against this trait so tests can drive it with a
/// scripted implementation instead of a real transcoder.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Decode the whole audio stream of `source` into `dest` as 16 kHz mono
    /// 16-bit PCM WAV. Overwrites `dest`.
    async fn extract(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Same normalization, restricted to `[start, start + duration)`.
    async fn extract_window(&self, source: &Path, window: ChunkWindow, dest: &Path)
        -> Result<()>;
}

/// [`Extractor`] backed by an ffmpeg binary at an injected location.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    ffmpeg: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout: None,
        }
    }

    /// Bound each tool invocation; an exceeded bound is an extraction failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whole-file video-only sibling of [`Extractor::extract`]: drops the
    /// audio stream and stream-copies video into `dest`, landing through the
    /// same `.part` + rename pattern.
    pub async fn extract_video(&self, source: &Path, dest: &Path) -> Result<()> {
        let part = part_path(dest);

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-y")
            .arg("-i")
            .arg(source)
            .args(["-an", "-c:v", "copy", "-f", "mp4"])
            .arg(&part);

        self.run(cmd, &part)
            .await
            .map_err(|cause| ClipforgeError::Extraction {
                offset: 0.0,
                duration: 0.0,
                cause,
            })?;

        tokio::fs::rename(&part, dest).await?;
        debug!("Extracted video stream to {}", dest.display());
        Ok(())
    }

    /// Run the tool and leave its output at `part` on success. Returns the
    /// failure cause as a string so callers can attach window context.
    async fn run(&self, mut cmd: Command, part: &Path) -> std::result::Result<(), String> {
        cmd.kill_on_drop(true);

        let fut = cmd.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                let _ = std::fs::remove_file(part);
                format!("{} timed out after {:.1}s", self.ffmpeg.display(), limit.as_secs_f64())
            })?,
            None => fut.await,
        }
        .map_err(|e| format!("failed to run {}: {e}", self.ffmpeg.display()))?;

        if !output.status.success() {
            let _ = std::fs::remove_file(part);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.ffmpeg.display(),
                output.status,
                last_line(&stderr)
            ));
        }

        Ok(())
    }

    async fn run_audio(&self, cmd: Command, part: &Path, dest: &Path) -> std::result::Result<(), String> {
        self.run(cmd, part).await?;

        if let Err(cause) = verify_wav(part) {
            let _ = std::fs::remove_file(part);
            return Err(cause);
        }

        tokio::fs::rename(part, dest)
            .await
            .map_err(|e| format!("failed to land artifact at {}: {e}", dest.display()))
    }

    fn audio_args(&self, cmd: &mut Command, source: &Path, part: &Path) {
        cmd.arg("-i")
            .arg(source)
            .args([
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-ar",
                "16000",
                "-ac",
                "1",
                "-f",
                "wav",
            ])
            .arg(part);
    }
}

#[async_trait]
impl Extractor for FfmpegExtractor {
    async fn extract(&self, source: &Path, dest: &Path) -> Result<()> {
        let part = part_path(dest);

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-y");
        self.audio_args(&mut cmd, source, &part);

        self.run_audio(cmd, &part, dest)
            .await
            .map_err(|cause| ClipforgeError::Extraction {
                offset: 0.0,
                duration: 0.0,
                cause,
            })?;

        debug!("Extracted full audio stream to {}", dest.display());
        Ok(())
    }

    async fn extract_window(
        &self,
        source: &Path,
        window: ChunkWindow,
        dest: &Path,
    ) -> Result<()> {
        let part = part_path(dest);

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-y")
            .args(["-ss", &format!("{:.3}", window.start)])
            .args(["-t", &format!("{:.3}", window.duration)]);
        self.audio_args(&mut cmd, source, &part);

        self.run_audio(cmd, &part, dest)
            .await
            .map_err(|cause| ClipforgeError::Extraction {
                offset: window.start,
                duration: window.duration,
                cause,
            })?;

        debug!(
            "Extracted [{:.3}s, {:.3}s) to {}",
            window.start,
            window.end(),
            dest.display()
        );
        Ok(())
    }
}

/// Sibling name the tool writes to before the artifact is renamed into place.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// A failed tool run can dump pages of stderr; the last line carries the
/// actual diagnosis.
fn last_line(stderr: &str) -> &str {
    stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("no output")
}

fn verify_wav(path: &Path) -> std::result::Result<(), String> {
    let reader =
        hound::WavReader::open(path).map_err(|e| format!("artifact is not readable WAV: {e}"))?;
    let spec = reader.spec();

    if spec.sample_rate != TARGET_SAMPLE_RATE
        || spec.channels != TARGET_CHANNELS
        || spec.bits_per_sample != TARGET_BITS_PER_SAMPLE
    {
        return Err(format!(
            "artifact has unexpected spec: {} Hz, {} ch, {} bit",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        ));
    }

    Ok(())
}

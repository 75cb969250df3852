use crate::config::Config;
use crate::error::{ClipforgeError, Result};
use crate::media::{
    AudioChunk, ChunkScheduler, FfmpegExtractor, MediaInfo, MediaProbe, SchedulerConfig,
    SourceMedia,
};
use crate::workspace::Workspace;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Knobs for one staging run, resolved by the caller.
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Chunk window size in seconds.
    pub chunk_secs: f64,
    /// Concurrent extraction limit (1 = sequential).
    pub concurrency: usize,
    /// Show progress spinners.
    pub show_progress: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            chunk_secs: 30.0,
            concurrency: 1,
            show_progress: true,
        }
    }
}

/// Timing and volume figures from a staging run.
#[derive(Debug, Clone)]
pub struct StagingStats {
    pub total_time: Duration,
    pub probe_time: Duration,
    pub extraction_time: Duration,
    /// Number of chunks staged.
    pub chunk_count: usize,
    /// Source duration reported by the probe, in seconds.
    pub media_duration_secs: f64,
    /// Total payload bytes handed to the consumer.
    pub staged_bytes: usize,
}

/// Outcome of a successful staging run.
///
/// The chunk artifacts stay on disk until the caller releases the workspace;
/// payloads are already in memory for handoff.
#[derive(Debug)]
pub struct StagingResult {
    pub chunks: Vec<AudioChunk>,
    pub info: MediaInfo,
    pub workspace: Workspace,
    pub stats: StagingStats,
}

/// Stage a source video as an ordered sequence of transcription-ready audio
/// chunks.
///
/// 1. Probe the source for duration and stream layout
/// 2. Partition the duration into bounded windows
/// 3. Extract each window to a normalized WAV artifact in the workspace
/// 4. Materialize each artifact's bytes for handoff
///
/// On any failure the workspace is left without artifacts; on success it
/// holds exactly one artifact per chunk until the caller releases them.
pub async fn stage_media(
    input: &Path,
    config: &Config,
    staging: StagingConfig,
) -> Result<StagingResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    stage_media_with_cancel(input, config, staging, cancelled).await
}

/// Staging with cancellation support. Once the flag flips, no new extraction
/// starts; in-flight tool runs finish and the run rolls back.
pub async fn stage_media_with_cancel(
    input: &Path,
    config: &Config,
    staging: StagingConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<StagingResult> {
    let start_time = Instant::now();

    let source = SourceMedia::open(input)?;

    let multi_progress = if staging.show_progress {
        Some(MultiProgress::new())
    } else {
        None
    };

    if cancelled.load(Ordering::Relaxed) {
        return Err(ClipforgeError::Cancelled);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Probe
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 1/2: Probing {}", input.display());
    let probe_start = Instant::now();

    let probe_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(spinner_style());
        pb.set_message("Probing media...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let probe = MediaProbe::new(&config.ffprobe);
    let info = probe.probe(source.path()).await?;

    if let Some(pb) = probe_pb {
        pb.finish_with_message(format!("✓ Probed ({:.1}s of media)", info.duration_secs));
    }

    let probe_time = probe_start.elapsed();
    debug!(
        "Probe complete: {:.2}s duration, audio={}, video={}",
        info.duration_secs, info.has_audio, info.has_video
    );

    if !info.has_audio {
        return Err(ClipforgeError::UnsupportedMedia(format!(
            "{} has no audio stream",
            input.display()
        )));
    }

    if cancelled.load(Ordering::Relaxed) {
        return Err(ClipforgeError::Cancelled);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Chunk extraction
    // ═══════════════════════════════════════════════════════════════════════
    info!(
        "Stage 2/2: Staging audio in {:.0}s windows (concurrency: {})",
        staging.chunk_secs, staging.concurrency
    );
    let extraction_start = Instant::now();

    let extraction_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(spinner_style());
        pb.set_message("Extracting audio chunks...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let workspace = Workspace::new(&config.temp_dir);
    let extractor = Arc::new(FfmpegExtractor::new(&config.ffmpeg));
    let scheduler = ChunkScheduler::new(
        extractor,
        workspace.clone(),
        SchedulerConfig {
            chunk_secs: staging.chunk_secs,
            concurrency: staging.concurrency,
        },
    );

    let chunks = scheduler
        .stage_with_cancel(source.path(), info.duration_secs, cancelled)
        .await?;

    if let Some(pb) = extraction_pb {
        pb.finish_with_message(format!("✓ Staged {} audio chunk(s)", chunks.len()));
    }

    let extraction_time = extraction_start.elapsed();
    info!(
        "Staged {} chunk(s) in {:.2}s",
        chunks.len(),
        extraction_time.as_secs_f64()
    );

    let staged_bytes = chunks.iter().map(|c| c.payload.len()).sum();
    let stats = StagingStats {
        total_time: start_time.elapsed(),
        probe_time,
        extraction_time,
        chunk_count: chunks.len(),
        media_duration_secs: info.duration_secs,
        staged_bytes,
    };

    Ok(StagingResult {
        chunks,
        info,
        workspace,
        stats,
    })
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Print a summary of the staging results.
pub fn print_summary(result: &StagingResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                       Staging Complete                         ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Workspace:  {}", result.workspace.root().display());
    println!("  Chunks:     {}", result.stats.chunk_count);
    println!(
        "  Media:      {:.1}s{}",
        result.stats.media_duration_secs,
        result
            .info
            .format_name
            .as_deref()
            .map(|f| format!(" ({f})"))
            .unwrap_or_default()
    );
    println!(
        "  Payload:    {:.1} MiB",
        result.stats.staged_bytes as f64 / (1024.0 * 1024.0)
    );
    println!();
    println!("  Timing:");
    println!(
        "    Probe:    {:.2}s",
        result.stats.probe_time.as_secs_f64()
    );
    println!(
        "    Extract:  {:.2}s",
        result.stats.extraction_time.as_secs_f64()
    );
    println!(
        "    Total:    {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_config_default() {
        let config = StagingConfig::default();
        assert_eq!(config.chunk_secs, 30.0);
        assert_eq!(config.concurrency, 1);
        assert!(config.show_progress);
    }

    #[tokio::test]
    async fn test_stage_media_missing_input() {
        let config = Config::default();
        let result = stage_media(
            Path::new("/nonexistent/video.mp4"),
            &config,
            StagingConfig {
                show_progress: false,
                ..Default::default()
            },
        )
        .await;

        assert!(matches!(result, Err(ClipforgeError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_stage_media_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.mp4");
        std::fs::write(&input, b"container bytes").unwrap();

        let config = Config::default();
        let cancelled = Arc::new(AtomicBool::new(true));
        let result = stage_media_with_cancel(
            &input,
            &config,
            StagingConfig {
                show_progress: false,
                ..Default::default()
            },
            cancelled,
        )
        .await;

        assert!(matches!(result, Err(ClipforgeError::Cancelled)));
    }
}

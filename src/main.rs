use anyhow::{Context, Result};
use clap::Parser;
use clipforge::config::Config;
use clipforge::pipeline::{print_summary, stage_media_with_cancel, StagingConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(version, about = "Stage long-form video as transcription-ready audio chunks")]
#[command(
    long_about = "Decompose a source video into bounded-duration audio chunks (16 kHz mono PCM WAV), staged in a temp workspace and read back for handoff to a transcription consumer."
)]
struct Cli {
    /// Input video file
    input: PathBuf,

    /// Chunk window size in seconds
    #[arg(short = 's', long)]
    chunk_secs: Option<f64>,

    /// Number of concurrent extractions
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Workspace directory for staged artifacts
    #[arg(short, long)]
    temp_dir: Option<PathBuf>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe executable
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Leave staged artifacts in the workspace instead of releasing them
    #[arg(short, long)]
    keep_workspace: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Load configuration, then let CLI flags win
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(path) = cli.ffmpeg {
        config.ffmpeg = path;
    }
    if let Some(path) = cli.ffprobe {
        config.ffprobe = path;
    }
    if let Some(dir) = cli.temp_dir {
        config.temp_dir = dir;
    }
    if let Some(secs) = cli.chunk_secs {
        config.chunk_secs = secs;
    }
    if let Some(n) = cli.concurrency {
        config.concurrency = n;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    let staging = StagingConfig {
        chunk_secs: config.chunk_secs,
        concurrency: config.concurrency,
        show_progress: !cli.quiet,
    };

    info!("Input:       {}", cli.input.display());
    info!("Workspace:   {}", config.temp_dir.display());
    info!("Chunk size:  {:.0}s", config.chunk_secs);
    info!("Concurrency: {}", config.concurrency);

    // Ctrl-C flips the shared flag; the pipeline stops issuing work and
    // rolls back.
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, cancelling run");
        flag.store(true, Ordering::Relaxed);
    })
    .context("Failed to install interrupt handler")?;

    let result = stage_media_with_cancel(&cli.input, &config, staging, cancelled)
        .await
        .context("Staging failed")?;

    if !cli.quiet {
        print_summary(&result);
        for chunk in &result.chunks {
            println!(
                "  chunk {:>3}  [{:>8.3}s, {:>8.3}s)  {:>10} bytes  {}",
                chunk.index(),
                chunk.window.start,
                chunk.window.end(),
                chunk.payload.len(),
                chunk.path.display()
            );
        }
        println!();
    }

    if cli.keep_workspace {
        info!(
            "Workspace kept at {} ({} artifacts)",
            result.workspace.root().display(),
            result.chunks.len()
        );
    } else {
        result
            .workspace
            .release_all()
            .context("Failed to release workspace")?;
        info!("Workspace released");
    }

    Ok(())
}

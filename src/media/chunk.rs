use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{ClipforgeError, Result};
use crate::workspace::Workspace;

use super::extract::Extractor;
use super::stage::materialize;
use super::{AudioChunk, ChunkWindow};

/// Residual below this is float noise, not a real trailing window.
const TOLERANCE: f64 = 1e-6;

/// Partition a total duration into fixed-size windows.
///
/// Every window except possibly the last has the configured duration; the
/// last is truncated to the remainder and is never empty. Non-positive input
/// yields an empty plan, not an error.
pub fn plan_windows(total_secs: f64, chunk_secs: f64) -> Vec<ChunkWindow> {
    let mut windows = Vec::new();
    if total_secs <= 0.0 || chunk_secs <= 0.0 {
        return windows;
    }

    let mut start = 0.0;
    while start < total_secs - TOLERANCE {
        let duration = chunk_secs.min(total_secs - start);
        windows.push(ChunkWindow {
            index: windows.len(),
            start,
            duration,
        });
        start += duration;
    }

    windows
}

/// Settings for one scheduling run.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Window size in seconds.
    pub chunk_secs: f64,
    /// How many windows may extract at once. 1 keeps the run sequential.
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_secs: 30.0,
            concurrency: 1,
        }
    }
}

/// Drives extraction over the planned windows and hands back the staged
/// chunks in index order.
///
/// The contract is all-or-nothing: any failure mid-run releases every
/// artifact this run already produced before the error propagates, so a
/// caller never mistakes a partial chunk set for a complete one.
pub struct ChunkScheduler {
    extractor: Arc<dyn Extractor>,
    workspace: Workspace,
    config: SchedulerConfig,
}

impl ChunkScheduler {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        workspace: Workspace,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            extractor,
            workspace,
            config,
        }
    }

    /// Stage the whole source as materialized chunks.
    pub async fn stage(&self, source: &Path, total_secs: f64) -> Result<Vec<AudioChunk>> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.stage_with_cancel(source, total_secs, cancelled).await
    }

    /// Stage with a shared cancellation flag. Once the flag flips, no new
    /// extraction starts; in-flight ones finish, then everything rolls back.
    pub async fn stage_with_cancel(
        &self,
        source: &Path,
        total_secs: f64,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Vec<AudioChunk>> {
        let windows = plan_windows(total_secs, self.config.chunk_secs);
        if windows.is_empty() {
            debug!("Nothing to stage for {:.3}s of media", total_secs);
            return Ok(Vec::new());
        }

        if cancelled.load(Ordering::Relaxed) {
            return Err(ClipforgeError::Cancelled);
        }

        self.workspace.ensure()?;

        info!(
            "Staging {} window(s) of {} ({:.1}s total)",
            windows.len(),
            source.display(),
            total_secs
        );

        // A source that fits in one window skips the seek/trim arguments.
        if windows.len() == 1 {
            return self.stage_whole(source, windows[0]).await;
        }

        if self.config.concurrency > 1 {
            self.stage_concurrent(source, windows, cancelled).await
        } else {
            self.stage_sequential(source, windows, cancelled).await
        }
    }

    async fn stage_whole(&self, source: &Path, window: ChunkWindow) -> Result<Vec<AudioChunk>> {
        let path = self.workspace.allocate("chunk", "wav");

        let staged = match self.extractor.extract(source, &path).await {
            Ok(()) => {
                materialize(AudioChunk {
                    window,
                    path: path.clone(),
                    payload: Vec::new(),
                })
                .await
            }
            Err(e) => Err(e),
        };

        match staged {
            Ok(chunk) => Ok(vec![chunk]),
            Err(e) => {
                self.rollback(std::iter::once(path.as_path()));
                Err(e)
            }
        }
    }

    async fn stage_sequential(
        &self,
        source: &Path,
        windows: Vec<ChunkWindow>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Vec<AudioChunk>> {
        let mut chunks: Vec<AudioChunk> = Vec::with_capacity(windows.len());

        for window in windows {
            if cancelled.load(Ordering::Relaxed) {
                self.rollback(chunks.iter().map(|c| c.path.as_path()));
                return Err(ClipforgeError::Cancelled);
            }

            let path = self.workspace.allocate("chunk", "wav");
            debug!(
                "Staging chunk {} [{:.3}s, {:.3}s)",
                window.index,
                window.start,
                window.end()
            );

            let staged = match self.extractor.extract_window(source, window, &path).await {
                Ok(()) => {
                    materialize(AudioChunk {
                        window,
                        path: path.clone(),
                        payload: Vec::new(),
                    })
                    .await
                }
                Err(e) => Err(e),
            };

            match staged {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    self.rollback(
                        chunks
                            .iter()
                            .map(|c| c.path.as_path())
                            .chain(std::iter::once(path.as_path())),
                    );
                    return Err(e);
                }
            }
        }

        info!("Staged {} chunk(s)", chunks.len());
        Ok(chunks)
    }

    async fn stage_concurrent(
        &self,
        source: &Path,
        windows: Vec<ChunkWindow>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Vec<AudioChunk>> {
        let total = windows.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut futures = FuturesUnordered::new();

        for window in windows {
            let sem = semaphore.clone();
            let extractor = self.extractor.clone();
            let workspace = self.workspace.clone();
            let source = source.to_path_buf();
            let cancelled = cancelled.clone();

            futures.push(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");

                if cancelled.load(Ordering::Relaxed) {
                    return (window.index, Err(ClipforgeError::Cancelled));
                }

                let path = workspace.allocate("chunk", "wav");
                let staged = match extractor.extract_window(&source, window, &path).await {
                    Ok(()) => {
                        materialize(AudioChunk {
                            window,
                            path: path.clone(),
                            payload: Vec::new(),
                        })
                        .await
                    }
                    Err(e) => Err(e),
                };

                // A failed attempt cleans its own artifact; sibling rollback
                // only has to cover the successes.
                if staged.is_err() {
                    let _ = workspace.release(&path);
                }

                (window.index, staged)
            });
        }

        // Drive every attempt to completion before deciding the outcome, so
        // rollback never races an in-flight write.
        let mut results: Vec<(usize, Result<AudioChunk>)> = Vec::with_capacity(total);
        while let Some(result) = futures.next().await {
            results.push(result);
        }
        results.sort_by_key(|(index, _)| *index);

        if results.iter().any(|(_, r)| r.is_err()) {
            let staged_paths: Vec<_> = results
                .iter()
                .filter_map(|(_, r)| r.as_ref().ok().map(|c| c.path.clone()))
                .collect();
            self.rollback(staged_paths.iter().map(|p| p.as_path()));

            let (index, first_err) = results
                .into_iter()
                .find(|(_, r)| r.is_err())
                .expect("error presence checked above");
            warn!("Chunk {} failed, run rolled back", index);
            return Err(first_err.unwrap_err());
        }

        let chunks: Vec<AudioChunk> = results
            .into_iter()
            .map(|(_, r)| r.expect("all results verified ok"))
            .collect();

        info!("Staged {} chunk(s)", chunks.len());
        Ok(chunks)
    }

    /// Delete the given artifacts. Failures here are logged, not propagated:
    /// the original error must survive rollback.
    fn rollback<'a>(&self, paths: impl Iterator<Item = &'a Path>) {
        let mut released = 0usize;
        for path in paths {
            match self.workspace.release(path) {
                Ok(()) => released += 1,
                Err(e) => warn!("Rollback could not remove {}: {e}", path.display()),
            }
        }
        if released > 0 {
            info!("Rolled back {} staged artifact(s)", released);
        }
    }
}

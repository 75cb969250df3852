//! Integration tests for the staging pipeline.
//!
//! The scheduler is driven by a scripted extractor, so these tests cover
//! window planning, rollback, and materialization without a real transcoder
//! on the machine.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use clipforge::error::{ClipforgeError, Result};
use clipforge::media::{ChunkScheduler, ChunkWindow, Extractor, SchedulerConfig};
use clipforge::workspace::Workspace;

/// Extractor that writes marker payloads instead of running a transcoder.
/// Optionally fails at one window index, and can stall to shuffle completion
/// order under concurrency.
struct ScriptedExtractor {
    fail_at: Option<usize>,
    stagger: bool,
    whole_file_calls: AtomicUsize,
    window_calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn ok() -> Self {
        Self {
            fail_at: None,
            stagger: false,
            whole_file_calls: AtomicUsize::new(0),
            window_calls: AtomicUsize::new(0),
        }
    }

    fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::ok()
        }
    }

    fn staggered() -> Self {
        Self {
            stagger: true,
            ..Self::ok()
        }
    }

    fn payload_for(window: ChunkWindow) -> Vec<u8> {
        vec![window.index as u8; (window.index + 1) * 16]
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, _source: &Path, dest: &Path) -> Result<()> {
        self.whole_file_calls.fetch_add(1, Ordering::Relaxed);
        std::fs::write(dest, b"whole-file artifact")?;
        Ok(())
    }

    async fn extract_window(
        &self,
        _source: &Path,
        window: ChunkWindow,
        dest: &Path,
    ) -> Result<()> {
        self.window_calls.fetch_add(1, Ordering::Relaxed);

        if self.stagger {
            // Later windows finish first, exercising the re-ordering path.
            let delay = 40u64.saturating_sub(window.index as u64 * 10);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        if self.fail_at == Some(window.index) {
            return Err(ClipforgeError::Extraction {
                offset: window.start,
                duration: window.duration,
                cause: "injected failure".to_string(),
            });
        }

        std::fs::write(dest, Self::payload_for(window))?;
        Ok(())
    }
}

fn scheduler_with(
    extractor: Arc<ScriptedExtractor>,
    root: &Path,
    chunk_secs: f64,
    concurrency: usize,
) -> ChunkScheduler {
    ChunkScheduler::new(
        extractor,
        Workspace::new(root),
        SchedulerConfig {
            chunk_secs,
            concurrency,
        },
    )
}

fn artifact_count(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }
    std::fs::read_dir(root).unwrap().count()
}

// ============================================================================
// Scheduling
// ============================================================================

mod scheduling {
    use super::*;

    #[tokio::test]
    async fn test_75s_source_stages_three_ordered_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let scheduler = scheduler_with(Arc::new(ScriptedExtractor::ok()), &root, 30.0, 1);

        let chunks = scheduler.stage(Path::new("talk.mp4"), 75.0).await.unwrap();

        assert_eq!(chunks.len(), 3);
        let expected = [(0.0, 30.0), (30.0, 30.0), (60.0, 15.0)];
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index(), i);
            assert!((chunk.window.start - expected[i].0).abs() < 1e-6);
            assert!((chunk.window.duration - expected[i].1).abs() < 1e-6);
            assert_eq!(chunk.payload, ScriptedExtractor::payload_for(chunk.window));
            assert!(chunk.path.starts_with(&root));
        }

        // One artifact per chunk stays staged until released.
        assert_eq!(artifact_count(&root), 3);
    }

    #[tokio::test]
    async fn test_chunks_tile_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let scheduler = scheduler_with(Arc::new(ScriptedExtractor::ok()), &root, 30.0, 1);

        let chunks = scheduler.stage(Path::new("talk.mp4"), 100.0).await.unwrap();

        assert_eq!(chunks.len(), 4);
        for pair in chunks.windows(2) {
            assert!((pair[0].window.end() - pair[1].window.start).abs() < 1e-6);
        }
        let sum: f64 = chunks.iter().map(|c| c.window.duration).sum();
        assert!((sum - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_duration_yields_empty_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let extractor = Arc::new(ScriptedExtractor::ok());
        let scheduler = scheduler_with(extractor.clone(), &root, 30.0, 1);

        let chunks = scheduler.stage(Path::new("talk.mp4"), 0.0).await.unwrap();

        assert!(chunks.is_empty());
        assert_eq!(artifact_count(&root), 0);
        assert_eq!(extractor.window_calls.load(Ordering::Relaxed), 0);
        assert_eq!(extractor.whole_file_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_negative_duration_yields_empty_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let scheduler = scheduler_with(Arc::new(ScriptedExtractor::ok()), &root, 30.0, 1);

        let chunks = scheduler.stage(Path::new("talk.mp4"), -3.0).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_short_source_uses_whole_file_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let extractor = Arc::new(ScriptedExtractor::ok());
        let scheduler = scheduler_with(extractor.clone(), &root, 30.0, 1);

        let chunks = scheduler.stage(Path::new("short.mp4"), 12.0).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index(), 0);
        assert!((chunks[0].window.duration - 12.0).abs() < 1e-6);
        assert_eq!(chunks[0].payload, b"whole-file artifact");
        assert_eq!(extractor.whole_file_calls.load(Ordering::Relaxed), 1);
        assert_eq!(extractor.window_calls.load(Ordering::Relaxed), 0);
    }
}

// ============================================================================
// Rollback
// ============================================================================

mod rollback {
    use super::*;

    #[tokio::test]
    async fn test_failure_on_third_chunk_reports_window_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let scheduler = scheduler_with(Arc::new(ScriptedExtractor::failing_at(2)), &root, 30.0, 1);

        let result = scheduler.stage(Path::new("talk.mp4"), 75.0).await;

        match result {
            Err(ClipforgeError::Extraction {
                offset, duration, ..
            }) => {
                assert!((offset - 60.0).abs() < 1e-6);
                assert!((duration - 15.0).abs() < 1e-6);
            }
            other => panic!("Expected Extraction error, got: {other:?}"),
        }

        assert_eq!(artifact_count(&root), 0);
    }

    #[tokio::test]
    async fn test_failure_at_any_index_leaves_workspace_empty() {
        for fail_at in 0..3 {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("ws");
            let scheduler =
                scheduler_with(Arc::new(ScriptedExtractor::failing_at(fail_at)), &root, 30.0, 1);

            let result = scheduler.stage(Path::new("talk.mp4"), 75.0).await;

            assert!(result.is_err(), "fail_at={fail_at} should fail the run");
            assert_eq!(
                artifact_count(&root),
                0,
                "fail_at={fail_at} left artifacts behind"
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_failure_rolls_back_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let scheduler = scheduler_with(Arc::new(ScriptedExtractor::failing_at(1)), &root, 30.0, 4);

        let result = scheduler.stage(Path::new("talk.mp4"), 120.0).await;

        assert!(matches!(
            result,
            Err(ClipforgeError::Extraction { .. })
        ));
        assert_eq!(artifact_count(&root), 0);
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let scheduler = scheduler_with(Arc::new(ScriptedExtractor::ok()), &root, 30.0, 1);

        let cancelled = Arc::new(AtomicBool::new(true));
        let result = scheduler
            .stage_with_cancel(Path::new("talk.mp4"), 75.0, cancelled)
            .await;

        assert!(matches!(result, Err(ClipforgeError::Cancelled)));
        assert_eq!(artifact_count(&root), 0);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn test_out_of_order_completion_still_returns_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let scheduler = scheduler_with(Arc::new(ScriptedExtractor::staggered()), &root, 30.0, 4);

        let chunks = scheduler.stage(Path::new("talk.mp4"), 120.0).await.unwrap();

        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index(), i);
            assert_eq!(chunk.payload, ScriptedExtractor::payload_for(chunk.window));
        }
    }

    #[tokio::test]
    async fn test_concurrent_run_matches_sequential_result() {
        let sequential_dir = tempfile::tempdir().unwrap();
        let concurrent_dir = tempfile::tempdir().unwrap();

        let sequential = scheduler_with(
            Arc::new(ScriptedExtractor::ok()),
            &sequential_dir.path().join("ws"),
            30.0,
            1,
        );
        let concurrent = scheduler_with(
            Arc::new(ScriptedExtractor::ok()),
            &concurrent_dir.path().join("ws"),
            30.0,
            4,
        );

        let a = sequential.stage(Path::new("talk.mp4"), 100.0).await.unwrap();
        let b = concurrent.stage(Path::new("talk.mp4"), 100.0).await.unwrap();

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.window, y.window);
            assert_eq!(x.payload, y.payload);
        }
    }
}

// ============================================================================
// Workspace
// ============================================================================

mod workspace {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rapid_allocation_yields_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        let paths: HashSet<_> = (0..500).map(|_| ws.allocate("chunk", "wav")).collect();
        assert_eq!(paths.len(), 500);
    }

    #[test]
    fn test_release_all_after_staged_run() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let ws = Workspace::new(&root);
        ws.ensure().unwrap();

        for _ in 0..3 {
            std::fs::write(ws.allocate("chunk", "wav"), b"pcm").unwrap();
        }
        assert_eq!(artifact_count(&root), 3);

        ws.release_all().unwrap();
        assert!(!root.exists());
    }
}

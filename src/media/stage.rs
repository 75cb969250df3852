use tracing::debug;

use crate::error::Result;

use super::AudioChunk;

/// Read the chunk's artifact fully into memory and hand back the populated
/// chunk.
///
/// The artifact stays on disk: deciding when to release it belongs to the
/// caller, after the payload has been consumed downstream.
pub async fn materialize(mut chunk: AudioChunk) -> Result<AudioChunk> {
    let payload = tokio::fs::read(&chunk.path).await?;

    debug!(
        "Materialized chunk {} ({} bytes) from {}",
        chunk.window.index,
        payload.len(),
        chunk.path.display()
    );

    chunk.payload = payload;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClipforgeError;
    use crate::media::ChunkWindow;

    fn chunk_at(path: std::path::PathBuf) -> AudioChunk {
        AudioChunk {
            window: ChunkWindow {
                index: 0,
                start: 0.0,
                duration: 1.0,
            },
            path,
            payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_materialize_reads_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_0.wav");
        let data = vec![0xAB; 1234];
        std::fs::write(&path, &data).unwrap();

        let chunk = materialize(chunk_at(path)).await.unwrap();
        assert_eq!(chunk.payload.len(), 1234);
        assert_eq!(chunk.payload, data);
    }

    #[tokio::test]
    async fn test_materialize_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.wav");

        let result = materialize(chunk_at(path)).await;
        assert!(matches!(result, Err(ClipforgeError::Io(_))));
    }

    #[tokio::test]
    async fn test_materialize_leaves_artifact_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_0.wav");
        std::fs::write(&path, b"payload").unwrap();

        let chunk = materialize(chunk_at(path.clone())).await.unwrap();
        assert!(path.exists());

        // Deleting the artifact makes a repeat call fail.
        std::fs::remove_file(&path).unwrap();
        let result = materialize(chunk).await;
        assert!(matches!(result, Err(ClipforgeError::Io(_))));
    }
}

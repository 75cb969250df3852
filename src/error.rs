use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipforgeError {
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Extraction failed at {offset:.3}s (+{duration:.3}s): {cause}")]
    Extraction {
        offset: f64,
        duration: f64,
        cause: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported media file: {0}")]
    UnsupportedMedia(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Staging cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClipforgeError>;

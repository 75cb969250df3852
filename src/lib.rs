pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod workspace;

pub use config::Config;
pub use error::{ClipforgeError, Result};
pub use pipeline::{
    print_summary, stage_media, stage_media_with_cancel, StagingConfig, StagingResult,
    StagingStats,
};
pub use workspace::Workspace;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{ClipforgeError, Result};

/// Process-wide counter so rapid allocations never collide, even when the
/// startup timestamp is shared by every path in the run.
static ALLOC_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A directory owned by one staging run.
///
/// All intermediate artifacts live under this directory. Construction does no
/// I/O; call [`Workspace::ensure`] before writing anything.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    startup_millis: u64,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let startup_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            root: root.into(),
            startup_millis,
        }
    }

    /// The directory this workspace owns.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the workspace directory if it does not exist yet.
    ///
    /// Safe to call repeatedly. Fails if the path cannot be created or exists
    /// but is not a directory.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;

        let meta = std::fs::metadata(&self.root)?;
        if !meta.is_dir() {
            return Err(ClipforgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("workspace path is not a directory: {}", self.root.display()),
            )));
        }
        if meta.permissions().readonly() {
            return Err(ClipforgeError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("workspace is not writable: {}", self.root.display()),
            )));
        }

        debug!("Workspace ready at {}", self.root.display());
        Ok(())
    }

    /// Return a path unique for the lifetime of the process.
    ///
    /// The file itself is not created; whoever writes it owns that step.
    pub fn allocate(&self, prefix: &str, extension: &str) -> PathBuf {
        let seq = ALLOC_COUNTER.fetch_add(1, Ordering::Relaxed);
        let filename = format!("{}_{}_{:06}.{}", prefix, self.startup_millis, seq, extension);
        self.root.join(filename)
    }

    /// Remove a single artifact. A missing file is not an error, so cleanup
    /// paths can call this as many times as they like.
    pub fn release(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Released {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the entire workspace tree. Teardown only; must not race
    /// in-flight extraction or materialization.
    pub fn release_all(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!("Removed workspace {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Private per-session scratch directories.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

const DIR_PREFIX: &str = "stata_session_";

/// A directory owned exclusively by one session.
///
/// The engine runs with this as its working directory, so command files, batch
/// logs and relative graph exports all land here.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh uniquely named directory under `base`, or under the
    /// system temp directory when `base` is `None`.
    pub fn create(base: Option<&Path>) -> io::Result<Self> {
        let base = base.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&base)?;
        let path = base.join(format!("{DIR_PREFIX}{}", Uuid::new_v4().simple()));
        std::fs::create_dir(&path)?;
        debug!(dir = %path.display(), "created scratch directory");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recreate the directory if something removed it behind our back.
    ///
    /// Returns `true` when the directory had to be recreated.
    pub fn ensure_exists(&self) -> io::Result<bool> {
        if self.path.is_dir() {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.path)?;
        debug!(dir = %self.path.display(), "recreated scratch directory");
        Ok(true)
    }

    /// A new file path `<prefix><token>.<extension>` with a random token.
    pub fn unique_file(&self, prefix: &str, extension: &str) -> PathBuf {
        let token = Uuid::new_v4().simple().to_string();
        self.path.join(format!("{prefix}{}.{extension}", &token[..12]))
    }

    /// Recursively remove the directory. Failures are logged, never raised.
    pub fn remove(&self) {
        remove_dir_quietly(&self.path);
    }

    /// [`remove`](Self::remove) on the blocking pool.
    pub async fn remove_async(&self) {
        let path = self.path.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || remove_dir_quietly(&path)).await {
            warn!(dir = %self.path.display(), error = %err, "scratch removal task failed");
        }
    }
}

fn remove_dir_quietly(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(dir = %path.display(), "removed scratch directory"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            dir = %path.display(),
            error = %err,
            "failed to remove scratch directory"
        ),
    }
}

/// Delete a file, ignoring any failure.
pub(crate) async fn remove_file_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != io::ErrorKind::NotFound {
            debug!(file = %path.display(), error = %err, "could not remove scratch file");
        }
    }
}

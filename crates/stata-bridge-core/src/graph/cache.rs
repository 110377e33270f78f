//! Snapshot-and-diff tracking of graph files in a directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use super::{encode_graph, GraphArtifact, GraphFormat};
use crate::error::ArtifactError;
use crate::obs;

/// Tracks graph files in `watch_dir` and reports new or modified ones.
///
/// ```ignore
/// let mut cache = GraphCache::new(scratch_dir);
/// cache.take_snapshot();           // before the command runs
/// // ... run the command ...
/// let graphs = cache.detect_changes();
/// ```
#[derive(Debug)]
pub struct GraphCache {
    watch_dir: PathBuf,
    snapshot: HashMap<PathBuf, SystemTime>,
}

impl GraphCache {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            snapshot: HashMap::new(),
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Record the modification time of every graph file currently present.
    pub fn take_snapshot(&mut self) {
        self.snapshot = self.scan();
        debug!(
            files = self.snapshot.len(),
            dir = %self.watch_dir.display(),
            "graph snapshot taken"
        );
    }

    /// Encode every graph file that is new or has a newer mtime than the last
    /// snapshot, then replace the snapshot with the current directory state.
    ///
    /// Files that fail to encode are logged and skipped; they are part of the
    /// new snapshot and will not be reported again unless modified.
    pub fn detect_changes(&mut self) -> Vec<GraphArtifact> {
        self.detect_changes_with(encode_graph)
    }

    fn detect_changes_with<F>(&mut self, encode: F) -> Vec<GraphArtifact>
    where
        F: Fn(&Path) -> Result<GraphArtifact, ArtifactError>,
    {
        let current = self.scan();
        let mut changed: Vec<(&PathBuf, GraphArtifact)> = Vec::new();

        for (path, mtime) in &current {
            let is_new_or_newer = match self.snapshot.get(path) {
                None => true,
                Some(previous) => mtime > previous,
            };
            if !is_new_or_newer {
                continue;
            }
            match encode(path.as_path()) {
                Ok(artifact) => {
                    obs::emit_graph_detected(path, artifact.format, artifact.content_base64.len());
                    changed.push((path, artifact));
                }
                Err(err) => warn!(path = %path.display(), error = %err, "failed to encode graph"),
            }
        }

        changed.sort_by(|(a, _), (b, _)| a.cmp(b));
        let artifacts = changed.into_iter().map(|(_, artifact)| artifact).collect();
        self.snapshot = current;
        artifacts
    }

    /// [`take_snapshot`](Self::take_snapshot) on the blocking thread pool.
    pub async fn take_snapshot_async(&mut self) {
        let mut cache = self.detach();
        match tokio::task::spawn_blocking(move || {
            cache.take_snapshot();
            cache
        })
        .await
        {
            Ok(cache) => *self = cache,
            Err(err) => warn!(error = %err, "graph snapshot task failed"),
        }
    }

    /// [`detect_changes`](Self::detect_changes) on the blocking thread pool.
    ///
    /// Directory scans and reading plus encoding large exports stay off the
    /// async workers.
    pub async fn detect_changes_async(&mut self) -> Vec<GraphArtifact> {
        let mut cache = self.detach();
        match tokio::task::spawn_blocking(move || {
            let artifacts = cache.detect_changes();
            (cache, artifacts)
        })
        .await
        {
            Ok((cache, artifacts)) => {
                *self = cache;
                artifacts
            }
            Err(err) => {
                warn!(error = %err, "graph detection task failed");
                Vec::new()
            }
        }
    }

    /// Move the state out, leaving an empty cache on the same directory.
    fn detach(&mut self) -> GraphCache {
        let empty = GraphCache::new(self.watch_dir.clone());
        std::mem::replace(self, empty)
    }

    fn scan(&self) -> HashMap<PathBuf, SystemTime> {
        let mut found = HashMap::new();
        let entries = match std::fs::read_dir(&self.watch_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %self.watch_dir.display(), error = %err, "graph directory not readable");
                return found;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if GraphFormat::from_path(&path).is_none() {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.is_file() => {
                    if let Ok(mtime) = meta.modified() {
                        found.insert(path, mtime);
                    }
                }
                Ok(_) => {}
                Err(err) => debug!(path = %path.display(), error = %err, "could not stat graph"),
            }
        }
        found
    }
}

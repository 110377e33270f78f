//! One batch-mode process per call.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, Instrument};

use super::echo::clean_do_output;
use super::{EngineSession, BATCH_FILE_PREFIX};
use crate::classify::classify;
use crate::config::{SessionConfig, SessionMode};
use crate::error::{Result, SessionError};
use crate::graph::{maybe_inject_graph_export, GraphCache};
use crate::installation::Installation;
use crate::obs;
use crate::result::ExecutionResult;
use crate::scratch::{remove_file_quietly, ScratchDir};
use crate::smcl::strip_smcl;

/// Flags that run a do-file non-interactively.
#[cfg(windows)]
const BATCH_FLAGS: [&str; 2] = ["/e", "do"];
#[cfg(not(windows))]
const BATCH_FLAGS: [&str; 2] = ["-b", "do"];

/// Runs each `execute` in a fresh batch-mode engine.
///
/// No state survives between calls. Kept as a fallback for environments
/// where an interactive console cannot be driven.
#[derive(Debug)]
pub struct BatchSession {
    id: String,
    installation: Installation,
    scratch: ScratchDir,
    graphs: GraphCache,
    log: Vec<String>,
    started: bool,
    closed: bool,
}

impl BatchSession {
    pub fn new(
        id: impl Into<String>,
        installation: Installation,
        config: &SessionConfig,
    ) -> Result<Self> {
        let scratch =
            ScratchDir::create(config.scratch_base.as_deref()).map_err(SessionError::Scratch)?;
        let graphs = GraphCache::new(scratch.path());
        Ok(Self {
            id: id.into(),
            installation,
            scratch,
            graphs,
            log: Vec::new(),
            started: false,
            closed: false,
        })
    }

    /// Where the engine writes the log for `do_file`.
    fn log_path_for(&self, do_file: &Path) -> PathBuf {
        let stem = do_file.file_stem().unwrap_or_default();
        self.scratch.path().join(stem).with_extension("log")
    }

    async fn run(&mut self, code: &str, timeout: Duration) -> ExecutionResult {
        let started = Instant::now();
        if self.closed {
            return ExecutionResult::failure(
                SessionError::Closed(self.id.clone()).to_string(),
                started.elapsed(),
            );
        }
        if let Err(err) = self.start().await {
            return ExecutionResult::failure(err.to_string(), started.elapsed());
        }

        let code = maybe_inject_graph_export(code, self.scratch.path());
        self.graphs.take_snapshot_async().await;

        let do_file = self.scratch.unique_file(BATCH_FILE_PREFIX, "do");
        if let Err(err) = tokio::fs::write(&do_file, code.as_bytes()).await {
            return ExecutionResult::failure(
                format!("failed to write command file {}: {err}", do_file.display()),
                started.elapsed(),
            );
        }
        let log_path = self.log_path_for(&do_file);

        debug!(do_file = %do_file.display(), "running batch engine");
        let child = Command::new(&self.installation.path)
            .args(BATCH_FLAGS)
            .arg(&do_file)
            .current_dir(self.scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(source) => {
                remove_file_quietly(&do_file).await;
                let err = SessionError::Spawn {
                    path: self.installation.path.clone(),
                    source,
                };
                return ExecutionResult::failure(err.to_string(), started.elapsed());
            }
        };

        // Dropping the future on timeout drops the child, which kills it.
        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
        remove_file_quietly(&do_file).await;
        let existing_log = tokio::fs::metadata(&log_path)
            .await
            .is_ok_and(|meta| meta.is_file())
            .then(|| log_path.clone());

        let process_output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return ExecutionResult::failure(
                    format!("failed to wait for batch engine: {err}"),
                    started.elapsed(),
                )
                .with_log_path(existing_log);
            }
            Err(_elapsed) => {
                obs::emit_execute_timed_out(&self.id, timeout.as_secs_f64());
                return ExecutionResult::failure(
                    format!("Command timed out after {}s", timeout.as_secs_f64()),
                    started.elapsed(),
                )
                .with_log_path(existing_log);
            }
        };

        let raw = match tokio::fs::read(&log_path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                debug!(error = %err, "no batch log; using process output");
                let mut combined = String::from_utf8_lossy(&process_output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&process_output.stderr));
                combined
            }
        };

        let output = clean_do_output(&strip_smcl(&raw), &do_file);
        let classification = classify(&output);
        let graphs = self.graphs.detect_changes_async().await;
        self.log.push(output.clone());
        ExecutionResult::from_output(
            output,
            classification,
            graphs,
            started.elapsed(),
            existing_log,
        )
    }
}

#[async_trait]
impl EngineSession for BatchSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn mode(&self) -> SessionMode {
        SessionMode::Batch
    }

    fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Only prepares the scratch directory; engines are spawned per call.
    async fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(SessionError::Closed(self.id.clone()));
        }
        self.scratch.ensure_exists().map_err(SessionError::Scratch)?;
        if !self.started {
            self.started = true;
            obs::emit_session_started(&self.id, SessionMode::Batch, None);
        }
        Ok(())
    }

    async fn execute(&mut self, code: &str, timeout: Duration) -> ExecutionResult {
        let span = obs::session_span(&self.id);
        let result = self.run(code, timeout).instrument(span).await;
        obs::emit_execute_finished(
            &self.id,
            result.return_code,
            result.duration_ms,
            result.graphs.len(),
        );
        result
    }

    /// A batch session is alive from `start` until `close`.
    fn is_alive(&mut self) -> bool {
        self.started && !self.closed
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        info!(session_id = %self.id, "closing batch session");
        self.scratch.remove_async().await;
        self.closed = true;
        self.started = false;
        obs::emit_session_closed(&self.id, self.log.len());
    }

    fn log_entries(&self) -> &[String] {
        &self.log
    }
}

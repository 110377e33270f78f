//! A long-lived console process driven over a pseudo-terminal.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use portable_pty::{Child, ChildKiller, MasterPty};
use tracing::{debug, info, warn, Instrument};

use super::echo::clean_do_output;
use super::prompt::{PromptReader, ReadOutcome};
use super::pty::{self, PtyOutput, PtyWriter};
use super::state::SessionState;
use super::{EngineSession, COMMAND_FILE_PREFIX};
use crate::classify::classify;
use crate::config::{SessionConfig, SessionMode};
use crate::error::{Result, SessionError};
use crate::graph::{maybe_inject_graph_export, GraphCache};
use crate::installation::Installation;
use crate::obs;
use crate::result::ExecutionResult;
use crate::scratch::{remove_file_quietly, ScratchDir};
use crate::smcl::strip_smcl;

pub(crate) const TERMINATED_MESSAGE: &str = "Stata process terminated unexpectedly";
const EXIT_COMMAND: &str = "exit, clear";
const EXIT_POLL: Duration = Duration::from_millis(50);

/// The running engine and its terminal. Dropping it kills the process.
struct Engine {
    child: Box<dyn Child + Send + Sync>,
    writer: PtyWriter,
    reader: PromptReader<PtyOutput>,
    _master: Box<dyn MasterPty + Send>,
}

impl Engine {
    fn spawn(installation: &Installation, cwd: &Path, session_id: &str) -> Result<Self> {
        let process = pty::spawn(&installation.path, &["-q"], cwd, session_id).map_err(
            |source| SessionError::Spawn {
                path: installation.path.clone(),
                source,
            },
        )?;
        Ok(Self {
            child: process.child,
            writer: process.writer,
            reader: PromptReader::new(process.output),
            _master: process.master,
        })
    }

    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill and reap on the blocking pool.
    async fn kill(self) {
        if let Err(err) = tokio::task::spawn_blocking(move || drop(self)).await {
            debug!(error = %err, "engine teardown task failed");
        }
    }

    /// Ask the engine to exit, then kill it once `grace` runs out.
    async fn shutdown(mut self, grace: Duration) {
        match self.writer.write_line(EXIT_COMMAND).await {
            Ok(()) => {
                let deadline = Instant::now() + grace;
                while !self.has_exited() && Instant::now() < deadline {
                    tokio::time::sleep(EXIT_POLL).await;
                }
            }
            Err(err) => debug!(error = %err, "could not send exit command"),
        }
        if !self.has_exited() {
            warn!(grace_secs = grace.as_secs_f64(), "engine ignored exit; killing");
        }
        self.kill().await;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.has_exited() {
            return;
        }
        if let Err(err) = self.child.kill() {
            debug!(error = %err, "kill failed; engine already gone");
        }
        let _ = self.child.try_wait();
    }
}

/// How a submitted command ended.
enum Submission {
    Completed(String),
    Exited,
    TimedOut,
}

/// One interactive Stata process with a private scratch directory.
///
/// Commands are written to a `.do` file in the scratch directory and run with
/// `do "<file>"`, so multi-line code, loops and programs behave exactly as in
/// a do-file. In-memory engine state persists between calls until the process
/// dies or the session is closed.
///
/// A timed-out command keeps running and the session stays `Executing`. The
/// next `execute` first waits for that command's prompt, discarding its
/// output, before submitting anything new.
pub struct ProcessSession {
    id: String,
    installation: Installation,
    config: SessionConfig,
    scratch: ScratchDir,
    graphs: GraphCache,
    state: SessionState,
    engine: Option<Engine>,
    log: Vec<String>,
    restarts: u32,
}

impl std::fmt::Debug for ProcessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("scratch", &self.scratch.path())
            .field("pid", &self.process_id())
            .field("restarts", &self.restarts)
            .finish()
    }
}

impl ProcessSession {
    /// Create the session and its scratch directory. Nothing is spawned
    /// until [`start`](EngineSession::start) or the first `execute`.
    pub fn new(
        id: impl Into<String>,
        installation: Installation,
        config: SessionConfig,
    ) -> Result<Self> {
        let scratch =
            ScratchDir::create(config.scratch_base.as_deref()).map_err(SessionError::Scratch)?;
        let graphs = GraphCache::new(scratch.path());
        Ok(Self {
            id: id.into(),
            installation,
            config,
            scratch,
            graphs,
            state: SessionState::Unstarted,
            engine: None,
            log: Vec::new(),
            restarts: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// OS process id of the running engine.
    pub fn process_id(&self) -> Option<u32> {
        self.engine.as_ref().and_then(Engine::pid)
    }

    /// How many times a dead engine has been replaced.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    /// Refresh `state` from the child's exit status.
    fn poll_engine(&mut self) {
        let exited = match self.engine.as_mut() {
            Some(engine) => engine.has_exited(),
            None => return,
        };
        if exited {
            debug!(session_id = %self.id, "engine process has exited");
            self.engine = None;
            if self.state.has_process() {
                self.state = SessionState::Dead;
            }
        }
    }

    async fn spawn_engine(&mut self) -> Result<()> {
        let restarting = self.state == SessionState::Dead;
        if let Some(old) = self.engine.take() {
            old.kill().await;
        }
        if self.scratch.ensure_exists().map_err(SessionError::Scratch)? {
            warn!(session_id = %self.id, "scratch directory was missing; recreated");
        }

        self.state = SessionState::Starting;
        info!(
            session_id = %self.id,
            installation = %self.installation,
            "starting engine"
        );

        let mut engine = match Engine::spawn(&self.installation, self.scratch.path(), &self.id) {
            Ok(engine) => engine,
            Err(err) => {
                self.state = SessionState::Dead;
                return Err(err);
            }
        };

        let start_timeout = self.config.start_timeout;
        let waited = tokio::time::timeout(start_timeout, engine.reader.read_until_ready()).await;
        let failure = match waited {
            Ok(Ok(ReadOutcome::Ready { output })) => {
                debug!(banner_bytes = output.len(), "engine reached ready prompt");
                None
            }
            Ok(Ok(ReadOutcome::Eof { output })) => {
                debug!(output = %output.trim(), "engine exited during startup");
                Some(SessionError::ExitedDuringStartup)
            }
            Ok(Err(err)) => Some(SessionError::Io(err)),
            Err(_elapsed) => Some(SessionError::StartupTimeout {
                timeout_secs: start_timeout.as_secs(),
            }),
        };
        if let Some(err) = failure {
            engine.kill().await;
            self.state = SessionState::Dead;
            return Err(err);
        }

        let pid = engine.pid();
        self.engine = Some(engine);
        self.state = SessionState::Ready;
        if restarting {
            self.restarts += 1;
            obs::emit_session_restarted(&self.id, self.restarts);
        }
        obs::emit_session_started(&self.id, SessionMode::Interactive, pid);
        Ok(())
    }

    /// Restart the engine if it is not running.
    async fn ensure_alive(&mut self) -> Result<()> {
        self.poll_engine();
        if self.state.needs_start() {
            if self.state == SessionState::Dead {
                warn!(session_id = %self.id, "engine process died; restarting");
            }
            self.spawn_engine().await?;
        }
        Ok(())
    }

    /// Consume the prompt owed by an earlier timed-out command.
    ///
    /// Returns `false` if the command is still running at `deadline`; the
    /// session then stays `Executing`.
    async fn resync(&mut self, deadline: Instant) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            self.state = SessionState::Dead;
            return true;
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, engine.reader.read_until_ready()).await {
            Ok(Ok(ReadOutcome::Ready { output })) => {
                debug!(
                    session_id = %self.id,
                    discarded_bytes = output.len(),
                    "previous command finished; output discarded"
                );
                self.state = SessionState::Ready;
                true
            }
            Ok(Ok(ReadOutcome::Eof { .. })) | Ok(Err(_)) => {
                self.mark_dead().await;
                true
            }
            Err(_elapsed) => false,
        }
    }

    async fn mark_dead(&mut self) {
        self.state = SessionState::Dead;
        if let Some(engine) = self.engine.take() {
            engine.kill().await;
        }
    }

    async fn submit(&mut self, do_file: &Path, deadline: Instant) -> Submission {
        let Some(engine) = self.engine.as_mut() else {
            return Submission::Exited;
        };
        let directive = format!("do \"{}\"", do_file.display());
        if let Err(err) = engine.writer.write_line(&directive).await {
            debug!(error = %err, "failed to write to engine terminal");
            return Submission::Exited;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, engine.reader.read_until_ready()).await {
            Ok(Ok(ReadOutcome::Ready { output })) => Submission::Completed(output),
            Ok(Ok(ReadOutcome::Eof { output })) => {
                debug!(output = %output.trim(), "engine hung up mid-command");
                Submission::Exited
            }
            Ok(Err(err)) => {
                debug!(error = %err, "failed to read engine output");
                Submission::Exited
            }
            Err(_elapsed) => Submission::TimedOut,
        }
    }

    async fn run(&mut self, code: &str, timeout: Duration) -> ExecutionResult {
        let started = Instant::now();
        if self.state == SessionState::Closed {
            return ExecutionResult::failure(
                SessionError::Closed(self.id.clone()).to_string(),
                started.elapsed(),
            );
        }
        if let Err(err) = self.ensure_alive().await {
            return ExecutionResult::failure(
                format!("failed to start Stata: {err}"),
                started.elapsed(),
            );
        }
        // Startup does not count against the command.
        let mut deadline = Instant::now() + timeout;

        if self.state == SessionState::Executing {
            if !self.resync(deadline).await {
                obs::emit_execute_timed_out(&self.id, timeout.as_secs_f64());
                return ExecutionResult::failure(
                    format!(
                        "Previous command is still running; timed out after {}s waiting for it",
                        timeout.as_secs_f64()
                    ),
                    started.elapsed(),
                );
            }
            if self.state.needs_start() {
                if let Err(err) = self.ensure_alive().await {
                    return ExecutionResult::failure(
                        format!("failed to start Stata: {err}"),
                        started.elapsed(),
                    );
                }
                deadline = Instant::now() + timeout;
            }
        }

        let code = maybe_inject_graph_export(code, self.scratch.path());
        self.graphs.take_snapshot_async().await;

        let do_file = self.scratch.unique_file(COMMAND_FILE_PREFIX, "do");
        if let Err(err) = tokio::fs::write(&do_file, code.as_bytes()).await {
            return ExecutionResult::failure(
                format!("failed to write command file {}: {err}", do_file.display()),
                started.elapsed(),
            );
        }

        self.state = SessionState::Executing;
        let submission = self.submit(&do_file, deadline).await;
        remove_file_quietly(&do_file).await;

        match submission {
            Submission::Completed(raw) => {
                self.state = SessionState::Ready;
                let output = clean_do_output(&strip_smcl(&raw), &do_file);
                let classification = classify(&output);
                let graphs = self.graphs.detect_changes_async().await;
                self.log.push(output.clone());
                ExecutionResult::from_output(output, classification, graphs, started.elapsed(), None)
            }
            // The command keeps running; its prompt is consumed by the next call.
            Submission::TimedOut => {
                obs::emit_execute_timed_out(&self.id, timeout.as_secs_f64());
                ExecutionResult::failure(
                    format!("Command timed out after {}s", timeout.as_secs_f64()),
                    started.elapsed(),
                )
            }
            Submission::Exited => {
                warn!(session_id = %self.id, "engine terminated while executing");
                self.mark_dead().await;
                ExecutionResult::failure(TERMINATED_MESSAGE, started.elapsed())
            }
        }
    }
}

#[async_trait]
impl EngineSession for ProcessSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn mode(&self) -> SessionMode {
        SessionMode::Interactive
    }

    fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    async fn start(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed(self.id.clone()));
        }
        self.poll_engine();
        if !self.state.needs_start() {
            debug!(session_id = %self.id, state = %self.state, "engine already running");
            return Ok(());
        }
        let span = obs::session_span(&self.id);
        self.spawn_engine().instrument(span).await
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

    fn is_alive(&mut self) -> bool {
        self.poll_engine();
        self.state.has_process()
    }

    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        if let Some(engine) = self.engine.take() {
            info!(session_id = %self.id, "closing engine");
            engine.shutdown(self.config.close_grace).await;
        }
        self.scratch.remove_async().await;
        self.state = SessionState::Closed;
        obs::emit_session_closed(&self.id, self.log.len());
    }

    fn log_entries(&self) -> &[String] {
        &self.log
    }
}

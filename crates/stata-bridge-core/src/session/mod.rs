//! Engine sessions.
//!
//! [`ProcessSession`] keeps one console process alive across calls so data
//! and estimation state persist. [`BatchSession`] spawns a fresh batch-mode
//! process per call. Both sit behind the [`EngineSession`] trait so the
//! registry can hold either.

mod batch;
mod echo;
mod interactive;
mod prompt;
mod pty;
mod state;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

pub use batch::BatchSession;
pub use echo::clean_do_output;
pub use interactive::ProcessSession;
pub use state::SessionState;

use crate::config::SessionMode;
use crate::error::Result;
use crate::result::ExecutionResult;

/// Prefix of command files written for interactive execution.
pub const COMMAND_FILE_PREFIX: &str = "_cmd_";
/// Prefix of command files written for batch execution.
pub const BATCH_FILE_PREFIX: &str = "_batch_";

/// A session that runs Stata code and reports structured results.
///
/// `execute` never fails: every problem, including timeouts and crashes, is
/// reported inside the returned [`ExecutionResult`].
#[async_trait]
pub trait EngineSession: Send {
    fn id(&self) -> &str;

    fn mode(&self) -> SessionMode;

    /// Directory the engine runs in and graphs are watched in.
    fn scratch_dir(&self) -> &Path;

    /// Bring the engine up. A no-op when it is already running.
    async fn start(&mut self) -> Result<()>;

    /// Run `code` and wait at most `timeout` for it to finish.
    async fn execute(&mut self, code: &str, timeout: Duration) -> ExecutionResult;

    /// Whether a following `execute` can run without a restart.
    fn is_alive(&mut self) -> bool;

    /// Shut down and remove the scratch directory. Safe to call repeatedly.
    async fn close(&mut self);

    /// Cleaned output of every command that completed, in order.
    fn log_entries(&self) -> &[String];

    /// The full session log joined by newlines.
    fn log(&self) -> String {
        self.log_entries().join("\n")
    }
}

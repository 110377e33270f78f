//! Error taxonomy for the session core.
//!
//! Only start-up and resource faults are modelled as errors. Anything that
//! goes wrong while a command runs is folded into a failing
//! [`ExecutionResult`](crate::result::ExecutionResult) instead.

use std::path::PathBuf;

/// Errors raised while bringing a session up or managing its resources.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to spawn {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine did not reach its ready prompt within {timeout_secs}s")]
    StartupTimeout { timeout_secs: u64 },

    #[error("engine exited before reaching its ready prompt")]
    ExitedDuringStartup,

    #[error("scratch directory error: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("session {0} has been closed")]
    Closed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors produced when encoding a graph file.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("unsupported graph format {extension:?} ({})", path.display())]
    UnsupportedFormat { extension: String, path: PathBuf },

    #[error("failed to read graph {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by installation discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(
        "no Stata installation found; set STATA_PATH to the full path of the Stata executable"
    )]
    NotFound,

    #[error("{} is not an executable file", .0.display())]
    NotExecutable(PathBuf),
}

use serde::{Deserialize, Serialize};

/// Lifecycle of an interactive session.
///
/// ```text
/// Unstarted -> Starting -> Ready <-> Executing
///                  |         |           |
///                  v         v           v
///                 Dead <-----+-----------+
///                  |
///                  +-> Starting (restart)
/// any -> Closing -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unstarted,
    Starting,
    Ready,
    /// A command is running. Held after a timeout until its prompt is read.
    Executing,
    /// The engine process exited or failed to start.
    Dead,
    Closing,
    /// Terminal. Nothing runs after close.
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Dead => "dead",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// States in which a live engine process is expected.
    pub fn has_process(self) -> bool {
        matches!(self, Self::Ready | Self::Executing)
    }

    /// States from which `start` would spawn a new process.
    pub fn needs_start(self) -> bool {
        matches!(self, Self::Unstarted | Self::Dead)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

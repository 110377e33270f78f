//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the base directory for scratch directories.
pub const SCRATCH_BASE_ENV: &str = "STATA_BRIDGE_TEMP";

/// Environment variable selecting the session mode (`interactive` or `batch`).
pub const MODE_ENV: &str = "STATA_BRIDGE_MODE";

/// Which session implementation the registry builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One long-lived console process per session.
    #[default]
    Interactive,
    /// A fresh batch-mode process per `execute`.
    Batch,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Batch => "batch",
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "batch" => Ok(Self::Batch),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// Timeouts and locations shared by every session a registry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base directory for scratch directories; system temp dir when `None`.
    pub scratch_base: Option<PathBuf>,
    /// Maximum wait for the first ready prompt.
    pub start_timeout: Duration,
    /// Timeout applied by callers that do not choose one.
    pub default_timeout: Duration,
    /// Grace period for `exit` before the process is killed.
    pub close_grace: Duration,
    pub mode: SessionMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scratch_base: None,
            start_timeout: Duration::from_secs(30),
            default_timeout: Duration::from_secs(120),
            close_grace: Duration::from_secs(10),
            mode: SessionMode::Interactive,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `STATA_BRIDGE_TEMP` and `STATA_BRIDGE_MODE`.
    ///
    /// An unparseable mode is ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base) = std::env::var_os(SCRATCH_BASE_ENV).filter(|v| !v.is_empty()) {
            config.scratch_base = Some(PathBuf::from(base));
        }
        if let Ok(mode) = std::env::var(MODE_ENV) {
            match mode.parse() {
                Ok(mode) => config.mode = mode,
                Err(err) => tracing::warn!(error = %err, "ignoring {MODE_ENV}"),
            }
        }
        config
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_scratch_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.scratch_base = Some(base.into());
        self
    }
}

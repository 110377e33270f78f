//! The structured product of one `execute` call.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::Classification;
use crate::graph::GraphArtifact;

/// Result of executing a block of Stata code.
///
/// `return_code` is derived from the presence of error signals only; it never
/// reflects the OS exit status of the engine process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Engine output with SMCL markup and command echo removed.
    pub output: String,
    /// 0 on success, 1 on failure.
    pub return_code: i32,
    pub error_message: Option<String>,
    /// Stata return code such as 111 or 198.
    pub error_code: Option<u32>,
    /// Graphs produced or rewritten by this call, in detection order.
    pub graphs: Vec<GraphArtifact>,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
    /// Log file written by the engine, when one exists.
    pub log_path: Option<PathBuf>,
}

impl ExecutionResult {
    /// Build a result from classified output.
    pub fn from_output(
        output: String,
        classification: Classification,
        graphs: Vec<GraphArtifact>,
        elapsed: Duration,
        log_path: Option<PathBuf>,
    ) -> Self {
        let return_code = if classification.is_success() { 0 } else { 1 };
        Self {
            output,
            return_code,
            error_message: classification.message,
            error_code: classification.code,
            graphs,
            duration_ms: elapsed.as_millis() as u64,
            log_path,
        }
    }

    /// Build a failure for a fault that happened outside the engine's own
    /// reporting (timeout, crash, I/O).
    pub fn failure(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            output: String::new(),
            return_code: 1,
            error_message: Some(message.into()),
            error_code: None,
            graphs: Vec::new(),
            duration_ms: elapsed.as_millis() as u64,
            log_path: None,
        }
    }

    /// Attach a log path to a result.
    pub fn with_log_path(mut self, log_path: Option<PathBuf>) -> Self {
        self.log_path = log_path;
        self
    }

    /// `true` iff neither an error message nor an error code is present.
    pub fn success(&self) -> bool {
        self.error_message.is_none() && self.error_code.is_none()
    }
}

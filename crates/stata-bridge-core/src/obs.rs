//! Structured observability hooks for session lifecycle events.
//!
//! Every event carries an `event = "..."` field so JSON logs can be filtered
//! by kind. Session futures are instrumented with [`session_span`], which
//! tags all nested records with the session id.

use std::path::Path;

use tracing::{info, warn};

use crate::config::SessionMode;
use crate::graph::GraphFormat;

/// Span tagging everything inside it with `session_id`.
///
/// Attach it with [`tracing::Instrument::instrument`] rather than entering it,
/// since session futures hold it across `.await`.
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("stata.session", session_id = %session_id)
}

/// Emit event: engine process started and reached its prompt.
pub fn emit_session_started(session_id: &str, mode: SessionMode, pid: Option<u32>) {
    info!(
        event = "session.started",
        session_id = %session_id,
        mode = mode.as_str(),
        pid = pid,
    );
}

/// Emit event: a dead engine was replaced by a new process.
pub fn emit_session_restarted(session_id: &str, restarts: u32) {
    warn!(event = "session.restarted", session_id = %session_id, restarts = restarts);
}

/// Emit event: session closed and its scratch directory released.
pub fn emit_session_closed(session_id: &str, log_entries: usize) {
    info!(event = "session.closed", session_id = %session_id, log_entries = log_entries);
}

/// Emit event: one `execute` call completed (successfully or not).
///
/// # Example
///
/// ```ignore
/// emit_execute_finished("default", 1, 42, 0);
/// // logs: event=execute.finished session_id=default return_code=1 duration_ms=42 graphs=0
/// ```
pub fn emit_execute_finished(session_id: &str, return_code: i32, duration_ms: u64, graphs: usize) {
    info!(
        event = "execute.finished",
        session_id = %session_id,
        return_code = return_code,
        duration_ms = duration_ms,
        graphs = graphs,
    );
}

/// Emit event: an `execute` call gave up waiting for the engine.
pub fn emit_execute_timed_out(session_id: &str, timeout_secs: f64) {
    warn!(event = "execute.timed_out", session_id = %session_id, timeout_secs = timeout_secs);
}

/// Emit event: a new or rewritten graph file was picked up.
pub fn emit_graph_detected(path: &Path, format: GraphFormat, encoded_bytes: usize) {
    info!(
        event = "graph.detected",
        path = %path.display(),
        format = %format,
        encoded_bytes = encoded_bytes,
    );
}

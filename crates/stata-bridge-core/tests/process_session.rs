//! Interactive session behaviour against the fake console engine.

#![cfg(unix)]

mod common;

use std::time::Duration;

use stata_bridge_core::{
    EngineSession, GraphFormat, ProcessSession, SessionError, SessionMode, SessionState,
};

use common::{fake_installation, fake_variant, test_config, TIMEOUT};

async fn started_session(base: &std::path::Path) -> ProcessSession {
    let mut session = ProcessSession::new(
        "test",
        fake_installation(),
        test_config(base, SessionMode::Interactive),
    )
    .unwrap();
    session.start().await.unwrap();
    session
}

// -------------------------------------------------------------------------
// Lifecycle
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_start_reaches_ready() {
    let base = tempfile::tempdir().unwrap();
    let mut session = ProcessSession::new(
        "test",
        fake_installation(),
        test_config(base.path(), SessionMode::Interactive),
    )
    .unwrap();
    assert_eq!(session.state(), SessionState::Unstarted);
    assert!(!session.is_alive());

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.is_alive());
    assert!(session.process_id().is_some());

    // Starting a running session is a no-op.
    let pid = session.process_id();
    session.start().await.unwrap();
    assert_eq!(session.process_id(), pid);

    session.close().await;
}

#[tokio::test]
async fn test_engine_runs_in_scratch_dir_with_dumb_terminal() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let result = session.execute("pwd\nenv", TIMEOUT).await;
    assert!(result.success(), "{result:?}");
    let scratch = session.scratch_dir().canonicalize().unwrap();
    assert!(result.output.contains(&scratch.display().to_string()));
    assert!(result.output.contains("TERM=dumb"));

    session.close().await;
}

#[tokio::test]
async fn test_close_removes_scratch_and_is_idempotent() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;
    let scratch = session.scratch_dir().to_path_buf();
    assert!(scratch.is_dir());

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!scratch.exists());
    assert!(!session.is_alive());

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_closed_session_refuses_work() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;
    session.close().await;

    let result = session.execute("display 1", TIMEOUT).await;
    assert_eq!(result.return_code, 1);
    assert!(result.error_message.unwrap().contains("closed"));
    assert!(matches!(session.start().await, Err(SessionError::Closed(_))));
}

#[tokio::test]
async fn test_startup_timeout() {
    let base = tempfile::tempdir().unwrap();
    let mut config = test_config(base.path(), SessionMode::Interactive);
    config.start_timeout = Duration::from_millis(300);
    let mut session =
        ProcessSession::new("slow", fake_variant(base.path(), "stata_hang"), config).unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, SessionError::StartupTimeout { .. }), "{err}");
    assert_eq!(session.state(), SessionState::Dead);
    assert!(session.process_id().is_none());
    session.close().await;
}

#[tokio::test]
async fn test_engine_exiting_during_startup() {
    let base = tempfile::tempdir().unwrap();
    let mut session = ProcessSession::new(
        "dies",
        fake_variant(base.path(), "stata_dies"),
        test_config(base.path(), SessionMode::Interactive),
    )
    .unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, SessionError::ExitedDuringStartup), "{err}");
    session.close().await;
}

#[tokio::test]
async fn test_startup_time_is_not_charged_to_the_command() {
    let base = tempfile::tempdir().unwrap();
    let mut session = ProcessSession::new(
        "slow",
        fake_variant(base.path(), "stata_slow"),
        test_config(base.path(), SessionMode::Interactive),
    )
    .unwrap();

    // The engine needs 0.6s to come up; the command itself is instant.
    let result = session.execute("display 1+1", Duration::from_millis(500)).await;
    assert_eq!(result.output, "2");
    assert!(result.success());
    assert_eq!(session.state(), SessionState::Ready);

    session.close().await;
}

#[tokio::test]
async fn test_spawn_failure_is_reported() {
    let base = tempfile::tempdir().unwrap();
    let mut session = ProcessSession::new(
        "missing",
        stata_bridge_core::Installation::new(base.path().join("no-such-stata")),
        test_config(base.path(), SessionMode::Interactive),
    )
    .unwrap();

    assert!(matches!(
        session.start().await,
        Err(SessionError::Spawn { .. })
    ));
    let result = session.execute("display 1", TIMEOUT).await;
    assert_eq!(result.return_code, 1);
    assert!(result.error_message.unwrap().contains("failed to start Stata"));
    session.close().await;
}

// -------------------------------------------------------------------------
// Execution
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_display_arithmetic() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let result = session.execute("display 1+1", TIMEOUT).await;
    assert_eq!(result.output, "2");
    assert_eq!(result.return_code, 0);
    assert!(result.error_message.is_none());
    assert!(result.error_code.is_none());
    assert!(result.graphs.is_empty());
    assert!(result.log_path.is_none());

    session.close().await;
}

#[tokio::test]
async fn test_unknown_command_is_classified() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let result = session.execute("foo_nonexistent_cmd", TIMEOUT).await;
    assert_eq!(result.return_code, 1);
    assert_eq!(result.error_code, Some(199));
    assert_eq!(
        result.error_message.as_deref(),
        Some("command foo_nonexistent_cmd is unrecognized")
    );

    // The session survives an engine-level error.
    let next = session.execute("display 5", TIMEOUT).await;
    assert_eq!(next.output, "5");
    session.close().await;
}

#[tokio::test]
async fn test_state_persists_between_calls() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    session.execute("global answer 42", TIMEOUT).await;
    let result = session.execute("display $answer", TIMEOUT).await;
    assert_eq!(result.output, "42");

    session.close().await;
}

#[tokio::test]
async fn test_markup_is_stripped() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let result = session.execute("sysuse auto\nsummarize", TIMEOUT).await;
    assert!(result.success());
    assert!(!result.output.contains('{'), "{}", result.output);
    assert!(result.output.contains("    Variable |        Obs        Mean"));
    assert!(result.output.contains("(1978 automobile data)"));

    session.close().await;
}

#[tokio::test]
async fn test_command_files_are_removed() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    session.execute("display 1", TIMEOUT).await;
    let leftovers: Vec<_> = std::fs::read_dir(session.scratch_dir())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("_cmd_"))
        .collect();
    assert!(leftovers.is_empty());

    session.close().await;
}

#[tokio::test]
async fn test_log_accumulates_cleaned_output() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    session.execute("display 1", TIMEOUT).await;
    session.execute("display \"two\"", TIMEOUT).await;
    assert_eq!(session.log_entries(), ["1".to_string(), "two".to_string()]);
    assert_eq!(session.log(), "1\ntwo");

    session.close().await;
}

// -------------------------------------------------------------------------
// Graphs
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_graph_export_is_injected_and_detected() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let result = session.execute("scatter price mpg", TIMEOUT).await;
    assert!(result.success(), "{result:?}");
    assert_eq!(result.graphs.len(), 1);
    let graph = &result.graphs[0];
    assert_eq!(graph.format, GraphFormat::Png);
    assert_eq!(graph.width, Some(2000));
    assert_eq!(graph.height, Some(1500));
    assert!(graph.path.starts_with(session.scratch_dir()));
    assert!(!graph.content_base64.is_empty());

    // Nothing new on the next call.
    let again = session.execute("display 1", TIMEOUT).await;
    assert!(again.graphs.is_empty());

    session.close().await;
}

#[tokio::test]
async fn test_explicit_export_is_detected_once() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let result = session
        .execute("scatter price mpg\ngraph export mine.png, replace", TIMEOUT)
        .await;
    assert_eq!(result.graphs.len(), 1);
    assert!(result.graphs[0].path.ends_with("mine.png"));

    session.close().await;
}

// -------------------------------------------------------------------------
// Faults
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_crash_reports_termination_then_restarts() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;
    session.execute("global kept 1", TIMEOUT).await;

    let crashed = session.execute("crash", TIMEOUT).await;
    assert_eq!(crashed.return_code, 1);
    assert_eq!(
        crashed.error_message.as_deref(),
        Some("Stata process terminated unexpectedly")
    );
    assert_eq!(session.state(), SessionState::Dead);
    assert!(!session.is_alive());

    // The next call restarts the engine; in-memory state is gone, the log stays.
    let result = session.execute("display $kept", TIMEOUT).await;
    assert!(result.success(), "{result:?}");
    assert_eq!(result.output, "");
    assert_eq!(session.restarts(), 1);
    assert_eq!(session.log_entries().len(), 2);

    session.close().await;
}

#[tokio::test]
async fn test_restart_after_external_kill() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let pid = session.process_id().unwrap();
    let status = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!session.is_alive());
    let result = session.execute("display 4", TIMEOUT).await;
    assert_eq!(result.output, "4");
    assert_ne!(session.process_id(), Some(pid));

    session.close().await;
}

#[tokio::test]
async fn test_restart_recreates_missing_scratch_dir() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    session.execute("crash", TIMEOUT).await;
    std::fs::remove_dir_all(session.scratch_dir()).unwrap();

    let result = session.execute("display 3", TIMEOUT).await;
    assert_eq!(result.output, "3");
    assert!(session.scratch_dir().is_dir());

    session.close().await;
}

#[tokio::test]
async fn test_timeout_then_resync() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    let timed_out = session.execute("wait 1", Duration::from_millis(200)).await;
    assert_eq!(timed_out.return_code, 1);
    assert!(timed_out
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Command timed out after 0.2s"));
    assert!(session.is_alive());
    // Still busy until the late prompt has been consumed.
    assert_eq!(session.state(), SessionState::Executing);

    // The late output of `wait 1` must not leak into the next result.
    let result = session.execute("display 7", TIMEOUT).await;
    assert_eq!(result.output, "7");
    assert!(result.success());
    assert_eq!(session.state(), SessionState::Ready);

    session.close().await;
}

#[tokio::test]
async fn test_still_running_previous_command() {
    let base = tempfile::tempdir().unwrap();
    let mut session = started_session(base.path()).await;

    session.execute("wait 2", Duration::from_millis(100)).await;
    let blocked = session.execute("display 1", Duration::from_millis(100)).await;
    assert_eq!(blocked.return_code, 1);
    assert!(blocked
        .error_message
        .unwrap()
        .contains("Previous command is still running"));
    assert_eq!(session.state(), SessionState::Executing);

    let result = session.execute("display 9", TIMEOUT).await;
    assert_eq!(result.output, "9");

    session.close().await;
}

//! Batch session behaviour against the fake engine's batch mode.

#![cfg(unix)]

mod common;

use std::time::Duration;

use stata_bridge_core::{BatchSession, EngineSession, GraphFormat, SessionMode};

use common::{fake_installation, test_config, TIMEOUT};

fn batch_session(base: &std::path::Path) -> BatchSession {
    BatchSession::new(
        "batch",
        fake_installation(),
        &test_config(base, SessionMode::Batch),
    )
    .unwrap()
}

#[tokio::test]
async fn test_batch_display_reads_log_file() {
    let base = tempfile::tempdir().unwrap();
    let mut session = batch_session(base.path());

    let result = session.execute("display 2+3", TIMEOUT).await;
    assert_eq!(result.output, "5");
    assert!(result.success());

    let log_path = result.log_path.expect("batch run writes a log");
    assert!(log_path.starts_with(session.scratch_dir()));
    assert_eq!(log_path.extension().unwrap(), "log");
    assert!(log_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("_batch_"));

    session.close().await;
}

#[tokio::test]
async fn test_batch_has_no_state_between_calls() {
    let base = tempfile::tempdir().unwrap();
    let mut session = batch_session(base.path());

    session.execute("global x 5", TIMEOUT).await;
    let result = session.execute("display $x", TIMEOUT).await;
    assert_eq!(result.output, "");

    session.close().await;
}

#[tokio::test]
async fn test_batch_error_classification() {
    let base = tempfile::tempdir().unwrap();
    let mut session = batch_session(base.path());

    let result = session.execute("error 111", TIMEOUT).await;
    assert_eq!(result.return_code, 1);
    assert_eq!(result.error_code, Some(111));

    session.close().await;
}

#[tokio::test]
async fn test_batch_graph_detection() {
    let base = tempfile::tempdir().unwrap();
    let mut session = batch_session(base.path());

    let result = session.execute("histogram price", TIMEOUT).await;
    assert_eq!(result.graphs.len(), 1);
    assert_eq!(result.graphs[0].format, GraphFormat::Png);
    assert_eq!(result.graphs[0].width, Some(2000));

    session.close().await;
}

#[tokio::test]
async fn test_batch_timeout() {
    let base = tempfile::tempdir().unwrap();
    let mut session = batch_session(base.path());

    let result = session.execute("wait 5", Duration::from_millis(200)).await;
    assert_eq!(result.return_code, 1);
    assert!(result
        .error_message
        .unwrap()
        .starts_with("Command timed out after"));
    assert!(result.duration_ms < 5000);

    session.close().await;
}

#[tokio::test]
async fn test_batch_lifecycle() {
    let base = tempfile::tempdir().unwrap();
    let mut session = batch_session(base.path());
    assert!(!session.is_alive());

    session.start().await.unwrap();
    assert!(session.is_alive());
    assert_eq!(session.mode(), SessionMode::Batch);

    session.execute("display 1", TIMEOUT).await;
    assert_eq!(session.log(), "1");

    let scratch = session.scratch_dir().to_path_buf();
    session.close().await;
    assert!(!session.is_alive());
    assert!(!scratch.exists());

    let after = session.execute("display 1", TIMEOUT).await;
    assert_eq!(after.return_code, 1);
}

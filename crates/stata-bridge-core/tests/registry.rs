//! Session registry behaviour against the fake console engine.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use stata_bridge_core::{SessionMode, SessionRegistry, DEFAULT_SESSION_ID};

use common::{fake_installation, fake_variant, test_config, TIMEOUT};

fn registry(base: &std::path::Path) -> SessionRegistry {
    SessionRegistry::new(
        fake_installation(),
        test_config(base, SessionMode::Interactive),
    )
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let base = tempfile::tempdir().unwrap();
    let registry = registry(base.path());

    registry
        .execute("alpha", "global who alpha", Some(TIMEOUT))
        .await
        .unwrap();
    registry
        .execute("beta", "global who beta", Some(TIMEOUT))
        .await
        .unwrap();

    let a = registry
        .execute("alpha", "display $who", Some(TIMEOUT))
        .await
        .unwrap();
    let b = registry
        .execute("beta", "display $who", Some(TIMEOUT))
        .await
        .unwrap();
    assert_eq!(a.output, "alpha");
    assert_eq!(b.output, "beta");

    registry.close_all().await;
}

#[tokio::test]
async fn test_get_or_create_returns_same_session() {
    let base = tempfile::tempdir().unwrap();
    let registry = registry(base.path());

    let first = registry.get_or_create(DEFAULT_SESSION_ID).await.unwrap();
    let second = registry.get_or_create(DEFAULT_SESSION_ID).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len().await, 1);

    registry.close_all().await;
}

#[tokio::test]
async fn test_list_is_sorted_and_reports_liveness() {
    let base = tempfile::tempdir().unwrap();
    let registry = registry(base.path());

    registry.get_or_create("zeta").await.unwrap();
    registry.get_or_create("alpha").await.unwrap();

    let infos = registry.list().await;
    let ids: Vec<_> = infos.iter().map(|i| i.session_id.as_str()).collect();
    assert_eq!(ids, ["alpha", "zeta"]);
    assert!(infos.iter().all(|i| i.alive));
    assert!(infos.iter().all(|i| i.mode == SessionMode::Interactive));

    registry.close_all().await;
}

#[tokio::test]
async fn test_dead_session_is_restarted_with_log_kept() {
    let base = tempfile::tempdir().unwrap();
    let registry = registry(base.path());

    registry
        .execute("s", "display 1", Some(TIMEOUT))
        .await
        .unwrap();
    let crashed = registry.execute("s", "crash", Some(TIMEOUT)).await.unwrap();
    assert_eq!(crashed.return_code, 1);

    let infos = registry.list().await;
    assert!(!infos[0].alive);

    let session = registry.get_or_create("s").await.unwrap();
    let mut guard = session.lock().await;
    assert!(guard.is_alive());
    assert_eq!(guard.log(), "1");
    drop(guard);

    registry.close_all().await;
}

#[tokio::test]
async fn test_failed_start_is_not_registered() {
    let base = tempfile::tempdir().unwrap();
    let registry = SessionRegistry::new(
        fake_variant(base.path(), "stata_dies"),
        test_config(base.path(), SessionMode::Interactive),
    );

    assert!(registry.get_or_create("broken").await.is_err());
    assert!(!registry.contains("broken").await);
    assert!(registry.execute("broken", "display 1", None).await.is_err());

    // No scratch directories are left behind.
    let leftovers: Vec<_> = std::fs::read_dir(base.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("stata_session_"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_close_session() {
    let base = tempfile::tempdir().unwrap();
    let registry = registry(base.path());

    let session = registry.get_or_create("temp").await.unwrap();
    let scratch = session.lock().await.scratch_dir().to_path_buf();

    assert!(registry.close_session("temp").await);
    assert!(!registry.close_session("temp").await);
    assert!(!scratch.exists());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_close_all_closes_every_session() {
    let base = tempfile::tempdir().unwrap();
    let registry = registry(base.path());

    let mut scratch_dirs = Vec::new();
    for id in ["a", "b", "c"] {
        let session = registry.get_or_create(id).await.unwrap();
        scratch_dirs.push(session.lock().await.scratch_dir().to_path_buf());
    }

    registry.close_all().await;
    assert!(registry.is_empty().await);
    assert!(scratch_dirs.iter().all(|dir| !dir.exists()));

    // Closing an empty registry is harmless.
    registry.close_all().await;
}

#[tokio::test]
async fn test_different_sessions_run_in_parallel() {
    let base = tempfile::tempdir().unwrap();
    let registry = Arc::new(registry(base.path()));
    registry.get_or_create("one").await.unwrap();
    registry.get_or_create("two").await.unwrap();

    let started = Instant::now();
    let r1 = Arc::clone(&registry);
    let r2 = Arc::clone(&registry);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { r1.execute("one", "wait 1", Some(TIMEOUT)).await }),
        tokio::spawn(async move { r2.execute("two", "wait 1", Some(TIMEOUT)).await }),
    );
    assert_eq!(a.unwrap().unwrap().output, "waited 1");
    assert_eq!(b.unwrap().unwrap().output, "waited 1");
    assert!(started.elapsed() < Duration::from_millis(1900));

    registry.close_all().await;
}

#[tokio::test]
async fn test_same_session_serialises_commands() {
    let base = tempfile::tempdir().unwrap();
    let registry = Arc::new(registry(base.path()));

    let r1 = Arc::clone(&registry);
    let r2 = Arc::clone(&registry);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { r1.execute("shared", "global n 1\ndisplay $n", Some(TIMEOUT)).await }),
        tokio::spawn(async move { r2.execute("shared", "global n 2\ndisplay $n", Some(TIMEOUT)).await }),
    );
    let mut outputs = vec![a.unwrap().unwrap().output, b.unwrap().unwrap().output];
    outputs.sort();
    assert_eq!(outputs, ["1", "2"]);

    registry.close_all().await;
}

#[tokio::test]
async fn test_batch_mode_registry() {
    let base = tempfile::tempdir().unwrap();
    let registry = SessionRegistry::new(
        fake_installation(),
        test_config(base.path(), SessionMode::Batch),
    );

    let result = registry.execute("b", "display 6*7", None).await.unwrap();
    assert_eq!(result.output, "42");
    assert!(result.log_path.is_some());
    assert_eq!(registry.list().await[0].mode, SessionMode::Batch);

    registry.close_all().await;
}

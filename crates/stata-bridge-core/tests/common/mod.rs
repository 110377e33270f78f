//! Shared fixtures: a fake console engine and throwaway scratch bases.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stata_bridge_core::{Installation, SessionConfig, SessionMode};

/// Path of the fake engine script, made executable if needed.
pub fn fake_engine_path() -> PathBuf {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_stata.sh");
    let mode = std::fs::metadata(&path)
        .expect("fake engine fixture exists")
        .permissions()
        .mode();
    if mode & 0o111 != 0o111 {
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("make fake engine executable");
    }
    path
}

pub fn fake_installation() -> Installation {
    Installation::new(fake_engine_path())
}

/// A config that keeps scratch directories under `base` and fails fast.
pub fn test_config(base: &Path, mode: SessionMode) -> SessionConfig {
    let mut config = SessionConfig::default()
        .with_mode(mode)
        .with_scratch_base(base);
    config.start_timeout = Duration::from_secs(10);
    config.default_timeout = Duration::from_secs(10);
    config.close_grace = Duration::from_secs(2);
    config
}

/// The fake engine reached through a symlink called `name` in `dir`.
///
/// A name containing `hang` never shows a prompt, one containing `dies` exits
/// during startup and one containing `slow` takes 0.6s to reach its prompt.
pub fn fake_variant(dir: &Path, name: &str) -> Installation {
    let link = dir.join(name);
    std::os::unix::fs::symlink(fake_engine_path(), &link).expect("symlink fake engine");
    Installation::new(link)
}

pub const TIMEOUT: Duration = Duration::from_secs(10);

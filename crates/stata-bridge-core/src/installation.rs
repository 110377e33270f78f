//! Stata installation reference and discovery.
//!
//! Discovery order:
//! 1. `STATA_PATH` (must point at an executable)
//! 2. Well-known install locations for the current platform
//! 3. `stata-mp`, `stata-se`, `stata`, `stata-be` on the `PATH`

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DiscoveryError;

/// Environment variable naming the Stata executable explicitly.
pub const STATA_PATH_ENV: &str = "STATA_PATH";

const PATH_NAMES: [&str; 4] = ["stata-mp", "stata-se", "stata", "stata-be"];

#[cfg(target_os = "macos")]
const SEARCH_PATTERNS: &[&str] = &[
    "/Applications/StataNow/StataMP.app/Contents/MacOS/stata-mp",
    "/Applications/StataNow/StataSE.app/Contents/MacOS/stata-se",
    "/Applications/StataNow/Stata.app/Contents/MacOS/stata",
    "/Applications/StataNow/StataBE.app/Contents/MacOS/stata-be",
    "/Applications/Stata*/StataMP.app/Contents/MacOS/stata-mp",
    "/Applications/Stata*/StataSE.app/Contents/MacOS/stata-se",
    "/Applications/Stata*/Stata.app/Contents/MacOS/stata",
    "/Applications/Stata*/StataBE.app/Contents/MacOS/stata-be",
    "/Applications/StataMP.app/Contents/MacOS/stata-mp",
    "/Applications/StataSE.app/Contents/MacOS/stata-se",
    "/Applications/Stata.app/Contents/MacOS/stata",
    "/Applications/StataBE.app/Contents/MacOS/stata-be",
];

#[cfg(windows)]
const SEARCH_PATTERNS: &[&str] = &[
    "C:/Program Files/Stata*/StataMP-64.exe",
    "C:/Program Files/Stata*/StataSE-64.exe",
    "C:/Program Files/Stata*/Stata-64.exe",
    "C:/Program Files/Stata*/StataBE-64.exe",
    "C:/Program Files/Stata*/StataMP.exe",
    "C:/Program Files/Stata*/StataSE.exe",
    "C:/Program Files/Stata*/Stata.exe",
    "C:/Program Files/Stata*/StataBE.exe",
    "C:/Program Files (x86)/Stata*/StataMP.exe",
    "C:/Program Files (x86)/Stata*/StataSE.exe",
    "C:/Program Files (x86)/Stata*/Stata.exe",
    "C:/Program Files (x86)/Stata*/StataBE.exe",
];

#[cfg(not(any(target_os = "macos", windows)))]
const SEARCH_PATTERNS: &[&str] = &[
    "/usr/local/stata*/stata-mp",
    "/usr/local/stata*/stata-se",
    "/usr/local/stata*/stata",
    "/usr/local/stata*/stata-be",
    "/usr/local/bin/stata-mp",
    "/usr/local/bin/stata-se",
    "/usr/local/bin/stata",
    "/usr/local/bin/stata-be",
];

static VERSION_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Ss]tata\s*(\d+)").expect("valid version regex"));

/// Stata product edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edition {
    #[serde(rename = "MP")]
    Mp,
    #[serde(rename = "SE")]
    Se,
    #[serde(rename = "IC")]
    Ic,
    #[serde(rename = "BE")]
    Be,
}

impl Edition {
    /// Edition implied by an executable name; unknown names are treated as IC.
    pub fn from_executable_name(name: &str) -> Self {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match stem.as_str() {
            "stata-mp" | "statamp" | "statamp-64" => Self::Mp,
            "stata-se" | "statase" | "statase-64" => Self::Se,
            "stata-be" | "statabe" | "statabe-64" => Self::Be,
            _ => Self::Ic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp => "MP",
            Self::Se => "SE",
            Self::Ic => "IC",
            Self::Be => "BE",
        }
    }
}

/// A resolved Stata executable. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub path: PathBuf,
    pub edition: Edition,
    /// Major version, when it can be read off the install path.
    pub version: Option<u32>,
}

impl Installation {
    /// Describe the executable at `path` without validating it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let edition = path
            .file_name()
            .map(|name| Edition::from_executable_name(&name.to_string_lossy()))
            .unwrap_or(Edition::Ic);
        let version = version_from_path(&path);
        Self {
            path,
            edition,
            version,
        }
    }

    /// Describe the executable at `path`, failing if it is not executable.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, DiscoveryError> {
        let path = path.into();
        if !is_executable(&path) {
            return Err(DiscoveryError::NotExecutable(path));
        }
        Ok(Self::new(path))
    }

    /// Stata 14+ handles Unicode.
    pub fn supports_unicode(&self) -> bool {
        self.version.is_some_and(|v| v >= 14)
    }

    /// Stata 16+ has frames.
    pub fn supports_frames(&self) -> bool {
        self.version.is_some_and(|v| v >= 16)
    }
}

impl std::fmt::Display for Installation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stata/{}", self.edition.as_str())?;
        if let Some(version) = self.version {
            write!(f, " {version}")?;
        }
        write!(f, " ({})", self.path.display())
    }
}

/// Find the best available installation.
pub fn discover() -> Result<Installation, DiscoveryError> {
    if let Some(env_path) = std::env::var_os(STATA_PATH_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(env_path);
        debug!(path = %path.display(), "checking {STATA_PATH_ENV}");
        if is_executable(&path) {
            let installation = Installation::new(canonical(path));
            info!(%installation, "Stata found via {STATA_PATH_ENV}");
            return Ok(installation);
        }
        debug!(path = %path.display(), "{STATA_PATH_ENV} is not an executable");
    }

    for pattern in SEARCH_PATTERNS {
        if let Some(found) = expand_pattern(pattern).into_iter().find(|p| is_executable(p)) {
            let installation = Installation::new(canonical(found));
            info!(%installation, "Stata found at well-known location");
            return Ok(installation);
        }
    }

    if let Some(found) = search_path_env() {
        let installation = Installation::new(canonical(found));
        info!(%installation, "Stata found on PATH");
        return Ok(installation);
    }

    info!("no Stata installation discovered");
    Err(DiscoveryError::NotFound)
}

/// Like [`discover`], but `None` instead of an error.
pub fn discover_or_none() -> Option<Installation> {
    discover().ok()
}

fn canonical(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

fn version_from_path(path: &Path) -> Option<u32> {
    path.components().find_map(|component| {
        let part = component.as_os_str().to_string_lossy();
        VERSION_DIR
            .captures(&part)
            .and_then(|caps| caps[1].parse().ok())
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn search_path_env() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    let dirs: Vec<PathBuf> = std::env::split_paths(&path_var).collect();
    PATH_NAMES.iter().find_map(|name| {
        dirs.iter().find_map(|dir| {
            let candidate = dir.join(name);
            is_executable(&candidate).then_some(candidate)
        })
    })
}

/// Expand a path whose components may contain a single `*` wildcard.
///
/// Matches within one directory are returned in sorted order.
fn expand_pattern(pattern: &str) -> Vec<PathBuf> {
    let mut current = vec![PathBuf::new()];
    for component in Path::new(pattern).components() {
        let part = component.as_os_str().to_string_lossy();
        let is_wildcard = matches!(component, Component::Normal(_)) && part.contains('*');
        if !is_wildcard {
            current = current.into_iter().map(|p| p.join(component)).collect();
            continue;
        }
        let (prefix, suffix) = part.split_once('*').unwrap_or((part.as_ref(), ""));
        let mut next = Vec::new();
        for dir in &current {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut matched: Vec<PathBuf> = entries
                .flatten()
                .filter(|entry| {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    name.len() >= prefix.len() + suffix.len()
                        && name.starts_with(prefix)
                        && name.ends_with(suffix)
                })
                .map(|entry| entry.path())
                .collect();
            matched.sort();
            next.extend(matched);
        }
        current = next;
    }
    current.into_iter().filter(|p| p.exists()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edition_from_name() {
        assert_eq!(Edition::from_executable_name("stata-mp"), Edition::Mp);
        assert_eq!(Edition::from_executable_name("StataSE-64.exe"), Edition::Se);
        assert_eq!(Edition::from_executable_name("stata-be"), Edition::Be);
        assert_eq!(Edition::from_executable_name("stata"), Edition::Ic);
        assert_eq!(Edition::from_executable_name("something-else"), Edition::Ic);
    }

    #[test]
    fn test_version_from_path() {
        assert_eq!(
            version_from_path(Path::new("/Applications/Stata18/StataMP.app/Contents/MacOS/stata-mp")),
            Some(18)
        );
        assert_eq!(version_from_path(Path::new("/usr/local/stata17/stata")), Some(17));
        assert_eq!(version_from_path(Path::new("/usr/local/bin/stata")), None);
    }

    #[test]
    fn test_capability_flags() {
        let mut inst = Installation::new("/usr/local/stata15/stata-se");
        assert_eq!(inst.version, Some(15));
        assert!(inst.supports_unicode());
        assert!(!inst.supports_frames());

        inst.version = None;
        assert!(!inst.supports_unicode());
    }

    #[test]
    fn test_display() {
        let inst = Installation::new("/usr/local/stata18/stata-mp");
        assert_eq!(inst.to_string(), "Stata/MP 18 (/usr/local/stata18/stata-mp)");
    }

    #[cfg(unix)]
    #[test]
    fn test_from_path_requires_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("stata-se");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        assert!(matches!(
            Installation::from_path(&exe),
            Err(DiscoveryError::NotExecutable(_))
        ));

        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        let inst = Installation::from_path(&exe).unwrap();
        assert_eq!(inst.edition, Edition::Se);
    }

    #[test]
    fn test_expand_pattern_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["stata17", "stata18", "other"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
            std::fs::write(dir.path().join(name).join("stata-mp"), "").unwrap();
        }
        let pattern = format!("{}/stata*/stata-mp", dir.path().display());
        let found = expand_pattern(&pattern);
        assert_eq!(
            found,
            vec![
                dir.path().join("stata17").join("stata-mp"),
                dir.path().join("stata18").join("stata-mp"),
            ]
        );
    }

    #[test]
    fn test_expand_pattern_without_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stata");
        std::fs::write(&file, "").unwrap();
        assert_eq!(expand_pattern(&file.display().to_string()), vec![file.clone()]);
        assert!(expand_pattern(&dir.path().join("missing").display().to_string()).is_empty());
    }

    #[test]
    fn test_installation_serializes_edition_code() {
        let inst = Installation::new("/usr/local/stata18/stata-mp");
        let json = serde_json::to_value(&inst).unwrap();
        assert_eq!(json["edition"], "MP");
        assert_eq!(json["version"], 18);
    }
}

//! Lexical detection of graph-drawing commands and export injection.
//!
//! This is pattern matching over lines, not parsing: a graph command hidden
//! behind a program or macro is missed, and a line such as `line 1` inside a
//! string block can trigger an export that then fails harmlessly.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

/// Pixel width used for injected PNG exports.
pub const EXPORT_WIDTH: u32 = 2000;

/// A graph-producing command at the start of a line, optionally `quietly`.
static GRAPH_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^[ \t]*(?:qui(?:etly)?[ \t]+)?",
        r"(?:graph|tw(?:oway)?|scatter|line|histogram|hist|kdensity|qnorm|pnorm",
        r"|rvfplot|avplot|lvr2plot|marginsplot|coefplot)\b",
    ))
    .expect("valid graph command regex")
});

/// An explicit `graph export` already present in the code.
static GRAPH_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:qui(?:etly)?[ \t]+)?graph[ \t]+export\b")
        .expect("valid graph export regex")
});

/// `true` when `code` appears to draw a graph.
pub fn draws_graph(code: &str) -> bool {
    GRAPH_COMMAND.is_match(code)
}

/// `true` when `code` already exports a graph itself.
pub fn has_graph_export(code: &str) -> bool {
    GRAPH_EXPORT.is_match(code)
}

/// Append a `graph export` line when `code` draws a graph but never exports
/// one. The export targets a timestamped PNG in `export_dir`.
pub fn maybe_inject_graph_export(code: &str, export_dir: &Path) -> String {
    if has_graph_export(code) {
        debug!("code already contains graph export; skipping injection");
        return code.to_string();
    }
    if !draws_graph(code) {
        return code.to_string();
    }

    let timestamp = chrono::Utc::now().timestamp_millis();
    let export_path = export_dir.join(format!("stata_graph_{timestamp}.png"));
    info!(file = %export_path.display(), "injecting graph export");
    format!(
        "{}\nquietly graph export \"{}\", width({EXPORT_WIDTH}) replace",
        code.trim_end(),
        export_path.display()
    )
}

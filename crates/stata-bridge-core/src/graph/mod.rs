//! Graph artifacts: detection, encoding and export injection.
//!
//! # Modules
//!
//! - [`cache`]: `GraphCache`, snapshot/diff of a watched directory
//! - [`export`]: `maybe_inject_graph_export()`, lexical graph-command detection

pub mod cache;
pub mod export;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ArtifactError;

pub use cache::GraphCache;
pub use export::maybe_inject_graph_export;

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Graph file formats the cache recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    Png,
    Pdf,
    Svg,
    /// Stata's native binary graph format.
    Gph,
}

impl GraphFormat {
    pub const ALL: [GraphFormat; 4] = [Self::Png, Self::Pdf, Self::Svg, Self::Gph];

    /// Match a file extension, ignoring case.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "pdf" => Some(Self::Pdf),
            "svg" => Some(Self::Svg),
            "gph" => Some(Self::Gph),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Pdf => "pdf",
            Self::Svg => "svg",
            Self::Gph => "gph",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
            Self::Svg => "image/svg+xml",
            Self::Gph => "application/x-stata-graph",
        }
    }
}

impl std::fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// A graph file produced by Stata, base64-encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphArtifact {
    pub path: PathBuf,
    pub format: GraphFormat,
    #[serde(rename = "base64")]
    pub content_base64: String,
    /// Pixel width, PNG only.
    pub width: Option<u32>,
    /// Pixel height, PNG only.
    pub height: Option<u32>,
}

/// Read `path` and encode it as a [`GraphArtifact`].
pub fn encode_graph(path: &Path) -> Result<GraphArtifact, ArtifactError> {
    let format = GraphFormat::from_path(path).ok_or_else(|| ArtifactError::UnsupportedFormat {
        extension: path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
    })?;

    let raw = std::fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (width, height) = match format {
        GraphFormat::Png => png_dimensions(path).unzip(),
        _ => (None, None),
    };

    debug!(
        path = %path.display(),
        format = %format,
        bytes = raw.len(),
        ?width,
        ?height,
        "encoded graph"
    );

    Ok(GraphArtifact {
        path: path.to_path_buf(),
        format,
        content_base64: BASE64_STANDARD.encode(&raw),
        width,
        height,
    })
}

/// Width and height from a PNG IHDR chunk (big-endian u32 at offsets 16 and 20).
///
/// Any read or format problem yields `None`.
pub fn png_dimensions(path: &Path) -> Option<(u32, u32)> {
    let mut header = [0u8; 24];
    let read = File::open(path).and_then(|mut file| file.read_exact(&mut header));
    if let Err(err) = read {
        debug!(path = %path.display(), error = %err, "could not read PNG header");
        return None;
    }
    if &header[..8] != PNG_MAGIC {
        return None;
    }
    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    Some((width, height))
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Minimal PNG prefix: magic, IHDR length/type, then width and height.
    pub fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(33);
        bytes.extend_from_slice(b"\x89PNG\r\n\x1a\n");
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }
}

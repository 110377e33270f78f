//! stata-bridge core library
//!
//! Drives a Stata engine as a subprocess and turns its console output into
//! structured results: cleaned text, error classification and any graphs the
//! command produced.

pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod installation;
pub mod obs;
pub mod registry;
pub mod result;
pub mod scratch;
pub mod session;
pub mod smcl;
pub mod telemetry;

pub use classify::{classify, Classification};
pub use config::{SessionConfig, SessionMode};
pub use error::{ArtifactError, DiscoveryError, Result, SessionError};
pub use graph::{
    encode_graph, maybe_inject_graph_export, GraphArtifact, GraphCache, GraphFormat,
};
pub use installation::{discover, discover_or_none, Edition, Installation};
pub use registry::{SessionInfo, SessionRegistry, SharedSession, DEFAULT_SESSION_ID};
pub use result::ExecutionResult;
pub use scratch::ScratchDir;
pub use session::{BatchSession, EngineSession, ProcessSession, SessionState};
pub use smcl::strip_smcl;
pub use telemetry::init_tracing;

/// stata-bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

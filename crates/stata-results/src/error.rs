//! Error types for stata-results

use thiserror::Error;

/// Errors raised before any command is sent to the engine.
///
/// A command that runs but fails is not an error; it yields an absent value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultsError {
    /// Result class other than `r`, `e` or `c`
    #[error("result class must be 'r', 'e', or 'c', got {0:?}")]
    InvalidClass(String),

    /// Result name that is not a plain Stata identifier
    #[error("invalid result name {0:?}")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, ResultsError>;

//! Stored-result extraction for stata-bridge sessions.
//!
//! Stata commands leave their results in three namespaces: `r()` for general
//! commands, `e()` for estimation commands and `c()` for system settings.
//! [`ResultExtractor`] queries them through any [`EngineSession`] and parses
//! the console output into typed values.
//!
//! [`EngineSession`]: stata_bridge_core::EngineSession

pub mod class;
pub mod error;
pub mod extractor;
pub mod parse;

pub use class::ResultClass;
pub use error::{Result, ResultsError};
pub use extractor::{ResultExtractor, DEFAULT_QUERY_TIMEOUT};
pub use parse::{
    is_missing, parse_matrix_output, parse_numeric, parse_return_list, parse_scalar_value, Matrix,
    MatrixShape, ScalarValue, StoredResults,
};

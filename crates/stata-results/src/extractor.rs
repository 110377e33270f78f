//! Stored-result queries issued through a live session.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use stata_bridge_core::EngineSession;
use tracing::debug;

use crate::class::ResultClass;
use crate::error::{Result, ResultsError};
use crate::parse::{
    last_value_line, parse_matrix_output, parse_return_list, parse_scalar_value, Matrix,
    ScalarValue, StoredResults,
};

/// Timeout for each query unless overridden.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

static RESULT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid result name regex"));

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if RESULT_NAME.is_match(name) {
        Ok(name)
    } else {
        Err(ResultsError::InvalidName(name.to_string()))
    }
}

/// Reads stored results by running small commands in a session.
///
/// Queries run in the session's own engine, so they see whatever the last
/// command left behind. Any failure while running a query yields an absent
/// value.
pub struct ResultExtractor<'a> {
    session: &'a mut dyn EngineSession,
    timeout: Duration,
}

impl<'a> ResultExtractor<'a> {
    pub fn new(session: &'a mut dyn EngineSession) -> Self {
        Self {
            session,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Output of `code`, or `None` if it failed.
    async fn query(&mut self, code: &str) -> Option<String> {
        let result = self.session.execute(code, self.timeout).await;
        if result.return_code != 0 {
            debug!(
                code = %code,
                error = ?result.error_message,
                "result query failed"
            );
            return None;
        }
        Some(result.output)
    }

    /// A single scalar, e.g. `r(mean)`. Missing values are `None`.
    pub async fn get_scalar(
        &mut self,
        name: &str,
        class: ResultClass,
    ) -> Result<Option<ScalarValue>> {
        let name = validate_name(name)?;
        let code = format!("display {}", class.reference(name));
        let Some(output) = self.query(&code).await else {
            return Ok(None);
        };
        Ok(last_value_line(&output).and_then(parse_scalar_value))
    }

    /// A string macro, e.g. `e(cmd)`.
    pub async fn get_macro(&mut self, name: &str, class: ResultClass) -> Result<Option<String>> {
        let name = validate_name(name)?;
        let code = format!("display {}", class.reference(name));
        let Some(output) = self.query(&code).await else {
            return Ok(None);
        };
        Ok(last_value_line(&output).map(str::to_string))
    }

    /// A matrix, e.g. `e(b)`, row-major with `NaN` for missing cells.
    pub async fn get_matrix(&mut self, name: &str, class: ResultClass) -> Result<Option<Matrix>> {
        let name = validate_name(name)?;
        let code = format!("matrix list {}", class.reference(name));
        let Some(output) = self.query(&code).await else {
            return Ok(None);
        };
        Ok(parse_matrix_output(&output))
    }

    /// Every scalar, macro and matrix name in `class`. Empty if the listing
    /// command fails.
    pub async fn get_all(&mut self, class: ResultClass) -> StoredResults {
        match self.query(class.list_command()).await {
            Some(output) => parse_return_list(&output),
            None => StoredResults::default(),
        }
    }
}

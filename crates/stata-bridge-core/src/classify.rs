//! Success/failure classification of cleaned engine output.
//!
//! Stata signals nothing structured when a command fails; it prints a message
//! followed by a return-code token such as `r(111);`. Coded failures always
//! win over the fallback phrase list, even if a phrase appears earlier.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ERROR_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"r\((\d+)\)").expect("valid error code regex"));

/// Failure phrases that Stata prints without a return code.
static FAILURE_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)no observations",
        r"(?i)variable\s+.+\s+not found",
        r"(?i)type mismatch",
        r"(?i)conformability error",
        r"(?i)op\.sys refuses to",
        r"(?i)could not find file",
        r"(?i)no room to add more",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid failure phrase regex"))
    .collect()
});

/// Outcome of scanning output for failure signals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Best-effort human readable failure message.
    pub message: Option<String>,
    /// Numeric Stata return code, when one was printed.
    pub code: Option<u32>,
}

impl Classification {
    /// `true` when neither a message nor a code was found.
    pub fn is_success(&self) -> bool {
        self.message.is_none() && self.code.is_none()
    }
}

/// Classify normalised engine output as success or failure.
pub fn classify(output: &str) -> Classification {
    if let Some(caps) = ERROR_CODE.captures(output) {
        // Digits only; an absurdly long code saturates rather than being lost.
        let code = caps[1].parse::<u32>().unwrap_or(u32::MAX);
        let message = output
            .lines()
            .map(str::trim)
            .take_while(|line| !ERROR_CODE.is_match(line))
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Stata error r({code})"));
        return Classification {
            message: Some(message),
            code: Some(code),
        };
    }

    FAILURE_PHRASES
        .iter()
        .find_map(|pattern| pattern.find(output))
        .map(|found| Classification {
            message: Some(found.as_str().to_string()),
            code: None,
        })
        .unwrap_or_default()
}

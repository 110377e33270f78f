//! Parsers for `display`, `matrix list` and `return list` style output.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static MISSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.[a-z]?$").expect("valid missing value regex"));

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("valid number regex")
});

/// `r(N) =  74`
static SCALAR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[rec]\((\w+)\)\s*=\s*(.+?)\s*$").expect("valid scalar line regex")
});

/// `e(cmd) : "regress"`
static MACRO_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*[rec]\((\w+)\)\s*:\s*"(.*?)"\s*$"#).expect("valid macro line regex")
});

/// `e(b) :  1 x 3`
static MATRIX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[rec]\((\w+)\)\s*:\s*(\d+)\s*x\s*(\d+)\s*$")
        .expect("valid matrix line regex")
});

/// `e(b)[1,3]` or `symmetric e(V)[3,3]`
static MATRIX_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(symmetric\s+)?(?:[rec]\(\w+\)|\w+)\[(\d+),(\d+)\]")
        .expect("valid matrix header regex")
});

/// A stored scalar: numeric, or a string when it does not parse as a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
}

impl ScalarValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// Row-major matrix values. Missing cells are `NaN`.
pub type Matrix = Vec<Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixShape {
    pub rows: usize,
    pub cols: usize,
}

/// Everything `return list`, `ereturn list` or `creturn list` printed.
///
/// Matrix contents are not part of those listings; fetch them with
/// `get_matrix`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredResults {
    /// `None` marks a missing value.
    pub scalars: BTreeMap<String, Option<ScalarValue>>,
    pub macros: BTreeMap<String, String>,
    pub matrices: BTreeMap<String, MatrixShape>,
}

impl StoredResults {
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.macros.is_empty() && self.matrices.is_empty()
    }
}

/// `.` and the extended missing values `.a` through `.z`.
pub fn is_missing(value: &str) -> bool {
    MISSING.is_match(value.trim())
}

/// Parse a Stata number. Missing values and non-numbers give `None`.
pub fn parse_numeric(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || is_missing(value) || !NUMBER.is_match(value) {
        return None;
    }
    value.parse().ok()
}

/// Interpret a displayed scalar, preferring a number over a string.
pub fn parse_scalar_value(raw: &str) -> Option<ScalarValue> {
    let raw = raw.trim();
    if raw.is_empty() || is_missing(raw) {
        return None;
    }
    Some(match parse_numeric(raw) {
        Some(n) => ScalarValue::Number(n),
        None => ScalarValue::Text(raw.to_string()),
    })
}

/// The last non-blank line of `output`, trimmed.
pub(crate) fn last_value_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
}

/// Parse `matrix list` output.
///
/// ```text
/// e(b)[1,3]
///             mpg      weight       _cons
/// y1   -49.512221   1.7465592   1946.0687
/// ```
///
/// Symmetric matrices are printed as a lower triangle and are mirrored back
/// into full form. Returns `None` when no header or no data row is found.
pub fn parse_matrix_output(output: &str) -> Option<Matrix> {
    let lines: Vec<&str> = output.lines().collect();
    let (header_idx, caps) = lines
        .iter()
        .enumerate()
        .find_map(|(idx, line)| MATRIX_HEADER.captures(line).map(|caps| (idx, caps)))?;

    let symmetric = caps.get(1).is_some();
    let nrows: usize = caps[2].parse().ok()?;
    let ncols: usize = caps[3].parse().ok()?;
    if nrows == 0 || ncols == 0 {
        return None;
    }

    // Skip the header and the column-label line.
    let mut matrix: Matrix = Vec::with_capacity(nrows);
    for line in lines.iter().skip(header_idx + 2) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let width = if symmetric { matrix.len() + 1 } else { ncols };
        // A row label precedes the values.
        if tokens.len() < width + 1 {
            debug!(line = %line, "skipping short matrix line");
            continue;
        }
        let row = tokens[tokens.len() - width..]
            .iter()
            .map(|token| parse_numeric(token).unwrap_or(f64::NAN))
            .collect();
        matrix.push(row);
        if matrix.len() == nrows {
            break;
        }
    }

    if matrix.is_empty() {
        return None;
    }
    if symmetric {
        mirror_lower_triangle(&mut matrix, ncols);
    }
    Some(matrix)
}

fn mirror_lower_triangle(matrix: &mut Matrix, ncols: usize) {
    for i in 0..matrix.len() {
        for j in (i + 1)..ncols {
            let value = matrix.get(j).and_then(|row| row.get(i)).copied();
            matrix[i].push(value.unwrap_or(f64::NAN));
        }
    }
}

/// Parse `return list` / `ereturn list` / `creturn list` output.
pub fn parse_return_list(output: &str) -> StoredResults {
    let mut results = StoredResults::default();
    for caps in SCALAR_LINE.captures_iter(output) {
        results
            .scalars
            .insert(caps[1].to_string(), parse_scalar_value(&caps[2]));
    }
    for caps in MACRO_LINE.captures_iter(output) {
        results.macros.insert(caps[1].to_string(), caps[2].to_string());
    }
    for caps in MATRIX_LINE.captures_iter(output) {
        let (Ok(rows), Ok(cols)) = (caps[2].parse(), caps[3].parse()) else {
            continue;
        };
        results
            .matrices
            .insert(caps[1].to_string(), MatrixShape { rows, cols });
    }
    results
}

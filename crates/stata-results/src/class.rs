//! The three stored-result namespaces.

use serde::{Deserialize, Serialize};

use crate::error::ResultsError;

/// Which namespace a stored result lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultClass {
    /// `r()`: general results such as those left by `summarize`.
    #[serde(rename = "r")]
    R,
    /// `e()`: estimation results such as those left by `regress`.
    #[serde(rename = "e")]
    E,
    /// `c()`: system parameters and settings.
    #[serde(rename = "c")]
    C,
}

impl ResultClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::R => "r",
            Self::E => "e",
            Self::C => "c",
        }
    }

    /// The command that lists every result in this namespace.
    pub fn list_command(self) -> &'static str {
        match self {
            Self::R => "return list",
            Self::E => "ereturn list",
            Self::C => "creturn list",
        }
    }

    /// `name` as a reference in this namespace, e.g. `e(r2)`.
    pub fn reference(self, name: &str) -> String {
        format!("{}({name})", self.as_str())
    }
}

impl std::fmt::Display for ResultClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResultClass {
    type Err = ResultsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" => Ok(Self::R),
            "e" => Ok(Self::E),
            "c" => Ok(Self::C),
            _ => Err(ResultsError::InvalidClass(s.to_string())),
        }
    }
}

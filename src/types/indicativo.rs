//! The station code (`indicativo`) used by AEMET as the grouping and persistence key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A validated AEMET station code such as `"3195"`, `"B278"` or `"1249X"`.
///
/// Only ASCII alphanumerics, `-` and `_` are accepted, which guarantees the
/// code is safe to use as a single path component inside the archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Indicativo(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid station code '{0}'")]
pub struct InvalidIndicativo(pub String);

impl Indicativo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Indicativo {
    type Err = InvalidIndicativo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidIndicativo(s.to_string()))
        }
    }
}

impl TryFrom<String> for Indicativo {
    type Error = InvalidIndicativo;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Indicativo> for String {
    fn from(value: Indicativo) -> Self {
        value.0
    }
}

impl fmt::Display for Indicativo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

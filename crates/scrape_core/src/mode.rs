use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Strategy selection requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// Plain HTTP fetch, no script execution.
    Static,
    /// Headless browser render.
    Dynamic,
    /// Static first, falling back to dynamic when the static pass yields nothing usable.
    #[default]
    Auto,
}

/// Strategy that actually produced a [`crate::ScrapeResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scrape mode `{0}` (expected static, dynamic or auto)")]
pub struct ParseModeError(pub String);

impl FromStr for ScrapeMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(ScrapeMode::Static),
            "dynamic" => Ok(ScrapeMode::Dynamic),
            "auto" => Ok(ScrapeMode::Auto),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeMode::Static => write!(f, "static"),
            ScrapeMode::Dynamic => write!(f, "dynamic"),
            ScrapeMode::Auto => write!(f, "auto"),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Static => write!(f, "static"),
            Strategy::Dynamic => write!(f, "dynamic"),
        }
    }
}

//! Lanes: independently throttled work classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Work class a task is queued under.
///
/// - `Main`: CPU-heavy work (transcription, file preparation).
/// - `Ai`: LLM calls; usually a single slot so providers are not flooded.
///
/// Scheduling visits lanes in [`Lane::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Main,
    Ai,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Main, Lane::Ai];

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Main => "main",
            Lane::Ai => "ai",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lane '{0}' (expected 'main' or 'ai')")]
pub struct UnknownLane(pub String);

impl FromStr for Lane {
    type Err = UnknownLane;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(Lane::Main),
            "ai" => Ok(Lane::Ai),
            other => Err(UnknownLane(other.to_string())),
        }
    }
}

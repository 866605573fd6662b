//! Final JSON document printed by the generator.

use serde::{Deserialize, Serialize};

use super::ProcessError;

/// On exit 0 the generator prints this as the last line of stdout. On a
/// failing run a `{"success": false, "error": ...}` line goes to stderr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub success: bool,

    /// One metadata object per generated item (one in compilation mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_files: Option<Vec<String>>,

    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResult {
    /// Parse the last line of `stdout` that holds a result document.
    pub fn from_stdout(stdout: &str) -> Result<Self, ProcessError> {
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|l| l.starts_with('{'))
            .find_map(|l| serde_json::from_str::<ProcessResult>(l).ok())
            .ok_or_else(|| ProcessError::InvalidOutput(snippet(stdout)))
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata.as_ref().map_or(0, Vec::len)
    }
}

/// Error message from the last `{"error": ...}` line in a stderr tail.
pub(crate) fn reported_error<'a>(lines: impl DoubleEndedIterator<Item = &'a String>) -> Option<String> {
    lines.rev().find_map(|line| {
        let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
        value.get("error")?.as_str().map(str::to_string)
    })
}

fn snippet(stdout: &str) -> String {
    const MAX: usize = 200;
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return "no output".to_string();
    }
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

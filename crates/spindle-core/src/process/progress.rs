//! Progress parsing for the generator's stderr.
//!
//! The generator logs free-form lines while it works. Known milestones map to
//! fixed percentages; input reading and video transcription sit between 15
//! and 25, transcript chunks interpolate between 25 and 55.

use std::sync::LazyLock;

use regex::Regex;

static PROCESSING_INPUTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Processing (\d+) inputs?").expect("static pattern"));

static CHUNK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Chunk (\d+)/(\d+)\s*$").expect("static pattern"));

static CONNECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bconnected( successfully)?$").expect("static pattern"));

static LOADING_WHISPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Loading Whisper \S+ model").expect("static pattern"));

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f32,
    pub message: String,
}

impl ProgressUpdate {
    fn new(percent: f32, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }
}

/// Map one stderr line to a progress milestone, if it is one.
pub fn parse_line(line: &str) -> Option<ProgressUpdate> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Echoes user input, so it must win over the pattern checks below.
    if let Some(input) = line.strip_prefix("Processing input:") {
        return Some(ProgressUpdate::new(16.0, format!("Reading {}", input.trim())));
    }
    if line.starts_with("Initializing AI Manager") {
        return Some(ProgressUpdate::new(5.0, "Initializing AI provider"));
    }
    if CONNECTED.is_match(line) {
        return Some(ProgressUpdate::new(10.0, "AI provider connected"));
    }
    if let Some(caps) = PROCESSING_INPUTS.captures(line) {
        return Some(ProgressUpdate::new(15.0, format!("Processing {} inputs", &caps[1])));
    }
    if LOADING_WHISPER.is_match(line) {
        return Some(ProgressUpdate::new(17.0, "Loading transcription model"));
    }
    if line.starts_with("Whisper model loaded") {
        return Some(ProgressUpdate::new(18.0, "Transcription model loaded"));
    }
    if let Some(video) = line.strip_prefix("Transcribing video:") {
        return Some(ProgressUpdate::new(20.0, format!("Transcribing {}", video.trim())));
    }
    if line.starts_with("Transcription complete") {
        return Some(ProgressUpdate::new(24.0, "Transcription complete"));
    }
    if line.starts_with("Summarizing transcript") || line.starts_with("Summarizing long transcript") {
        return Some(ProgressUpdate::new(25.0, "Summarizing transcript"));
    }
    if let Some(caps) = CHUNK.captures(line) {
        let i: u32 = caps[1].parse().ok()?;
        let n: u32 = caps[2].parse().ok()?;
        if n == 0 || i > n {
            return None;
        }
        let percent = 25.0 + 30.0 * i as f32 / n as f32;
        return Some(ProgressUpdate::new(percent, format!("Summarizing chunk {i}/{n}")));
    }
    if line.starts_with("Final summarization")
        || line.starts_with("Transcript summarized")
        || line.starts_with("Transcript chunked and summarized")
    {
        return Some(ProgressUpdate::new(55.0, "Transcript summarized"));
    }
    if line.starts_with("Starting consolidated metadata generation") {
        return Some(ProgressUpdate::new(60.0, "Generating metadata"));
    }
    if line.starts_with("Making consolidated request") {
        return Some(ProgressUpdate::new(65.0, "Waiting for AI response"));
    }
    if line.starts_with("Response received") {
        return Some(ProgressUpdate::new(80.0, "AI response received"));
    }
    if line.starts_with("Consolidated generation completed") {
        return Some(ProgressUpdate::new(90.0, "Metadata generated"));
    }
    None
}

/// Turns a stream of stderr lines into non-decreasing progress updates.
///
/// With several inputs the generator repeats its milestones per input; a
/// milestone below the highest one seen so far is swallowed.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: f32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, line: &str) -> Option<ProgressUpdate> {
        let update = parse_line(line)?;
        if update.percent < self.last {
            return None;
        }
        self.last = update.percent;
        Some(update)
    }

    pub fn last(&self) -> f32 {
        self.last
    }
}

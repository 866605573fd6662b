//! Subprocess collaborator: the metadata generator script.
//!
//! - **request**: generator command line
//! - **progress**: stderr milestones to percentages
//! - **result**: final JSON document
//! - **runner**: spawn, stream, cancel, collect
//! - **job**: the runner as a queue action

pub mod job;
pub mod progress;
pub mod request;
pub mod result;
pub mod runner;

pub use self::job::MetadataJob;
pub use self::progress::{ProgressTracker, ProgressUpdate, parse_line};
pub use self::request::{AiProvider, DEFAULT_AI_HOST, MetadataRequest, Mode, Platform, UnknownChoice};
pub use self::result::ProcessResult;
pub use self::runner::{DEFAULT_CANCEL_POLL, ProcessError, ProcessRunner};

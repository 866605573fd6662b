//! Runs the generator script as a child process.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::MissedTickBehavior;

use super::progress::ProgressTracker;
use super::request::{AiProvider, MetadataRequest};
use super::result::{ProcessResult, reported_error};
use crate::queue::TaskContext;

/// How often a running child is checked for a cancel request.
pub const DEFAULT_CANCEL_POLL: Duration = Duration::from_millis(500);

/// Stderr lines kept for building the error message of a failed run.
const STDERR_TAIL: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("at least one input is required")]
    EmptyInputs,

    #[error("AI provider '{0}' requires an API key")]
    MissingApiKey(AiProvider),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("generator i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("{message} ({status})")]
    Exit { status: ExitStatus, message: String },

    /// Exit 0, but the result document says `success: false`.
    #[error("{0}")]
    Reported(String),

    #[error("generator printed no result document: {0}")]
    InvalidOutput(String),

    #[error("generator cancelled")]
    Cancelled,
}

/// Spawns `program script <args>` and follows it to completion.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    script: PathBuf,
    working_dir: Option<PathBuf>,
    cancel_poll: Duration,
}

impl ProcessRunner {
    /// `program` is the interpreter (e.g. `python3`), `script` the generator.
    pub fn new(program: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            working_dir: None,
            cancel_poll: DEFAULT_CANCEL_POLL,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_cancel_poll(mut self, every: Duration) -> Self {
        self.cancel_poll = every;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub async fn run(
        &self,
        request: &MetadataRequest,
        ctx: &TaskContext,
    ) -> Result<ProcessResult, ProcessError> {
        let args = request.to_args()?;
        self.run_args(&args, ctx).await
    }

    /// Run with a prepared argument list.
    ///
    /// Stderr lines feed the task's progress reporter. The child is killed
    /// if the task gets a cancel request while it runs.
    pub async fn run_args(
        &self,
        args: &[String],
        ctx: &TaskContext,
    ) -> Result<ProcessResult, ProcessError> {
        let mut command = Command::new(&self.program);
        command
            .arg(&self.script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;
        tracing::debug!(task_id = %ctx.task_id(), pid = ?child.id(), script = %self.script.display(), "generator spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr not captured"))?;

        // Drain stdout concurrently so a chatty child never blocks on a full pipe.
        let stdout_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut stdout = stdout;
            stdout
                .read_to_end(&mut buf)
                .await
                .map(|_| String::from_utf8_lossy(&buf).into_owned())
        });

        let mut stderr = BufReader::new(stderr);
        let mut pending = Vec::new();
        let mut tracker = ProgressTracker::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        let mut poll = tokio::time::interval(self.cancel_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stderr_open = true;

        let status = loop {
            tokio::select! {
                read = stderr.read_until(b'\n', &mut pending), if stderr_open => {
                    if read? == 0 {
                        stderr_open = false;
                        continue;
                    }
                    let line = decode_line(&pending);
                    pending.clear();
                    tracing::trace!(task_id = %ctx.task_id(), line = %line, "generator stderr");
                    if let Some(update) = tracker.observe(&line) {
                        ctx.report_progress(update.percent, &update.message);
                    }
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                status = child.wait(), if !stderr_open => break status?,
                _ = poll.tick() => {
                    if ctx.is_cancelled() {
                        tracing::info!(task_id = %ctx.task_id(), "cancel requested; killing generator");
                        child.kill().await?;
                        stdout_reader.abort();
                        return Err(ProcessError::Cancelled);
                    }
                }
            }
        };

        let stdout = stdout_reader.await.map_err(io::Error::other)??;
        let result = interpret(status, &stdout, &tail);
        match &result {
            Ok(r) => tracing::debug!(task_id = %ctx.task_id(), items = r.metadata_count(), "generator finished"),
            Err(e) => tracing::debug!(task_id = %ctx.task_id(), error = %e, "generator failed"),
        }
        result
    }
}

/// Stderr may carry bytes that are not UTF-8, such as file names in a legacy
/// encoding. They become U+FFFD instead of failing the run.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

fn interpret(
    status: ExitStatus,
    stdout: &str,
    stderr_tail: &VecDeque<String>,
) -> Result<ProcessResult, ProcessError> {
    if status.success() {
        let result = ProcessResult::from_stdout(stdout)?;
        if !result.success {
            let message = result
                .error
                .unwrap_or_else(|| "generator reported failure".to_string());
            return Err(ProcessError::Reported(message));
        }
        return Ok(result);
    }

    let message = reported_error(stderr_tail.iter())
        .or_else(|| {
            stderr_tail
                .iter()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
        })
        .unwrap_or_else(|| format!("generator exited with {status}"));
    Err(ProcessError::Exit { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::QueueBuilder;
    use crate::domain::{Lane, Task};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tokio::sync::oneshot;

    fn script(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{body}").unwrap();
        file
    }

    struct Run {
        outcome: Result<ProcessResult, ProcessError>,
        progress: Vec<(f32, String)>,
    }

    /// Run `sh <script> <args>` as a queued task and hand back what the
    /// runner returned.
    async fn run_script(body: &str, args: &[&str]) -> Run {
        let file = script(body);
        let runner = ProcessRunner::new("sh", file.path()).with_cancel_poll(Duration::from_millis(20));
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let queue = QueueBuilder::new().build().unwrap();

        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&progress);
        let (tx, rx) = oneshot::channel();
        let task = Task::from_fn("gen", Lane::Ai, "gen", move |ctx| async move {
            let _ = tx.send(runner.run_args(&args, &ctx).await);
            Ok(Value::Null)
        })
        .with_progress(move |pct, msg| sink.lock().push((pct, msg.to_string())));

        queue.run(task).await.unwrap();
        let outcome = rx.await.unwrap();
        let progress = progress.lock().clone();
        Run { outcome, progress }
    }

    #[tokio::test]
    async fn successful_run_reports_progress_and_result() {
        let run = run_script(
            r#"
echo "Initializing AI Manager" >&2
echo "Ollama server connected" >&2
echo "Processing 1 inputs..." >&2
echo "   Chunk 1/2" >&2
echo "   Chunk 2/2" >&2
echo "   Response received (42 chars)" >&2
echo "some stray stdout line"
printf '{"success": true, "metadata": [{"args": "%s"}], "output_files": ["/tmp/a.json"], "processing_time": 1.5}\n' "$*"
"#,
            &["--inputs", "topic"],
        )
        .await;

        let result = run.outcome.unwrap();
        assert!(result.success);
        assert_eq!(result.metadata.unwrap()[0]["args"], "--inputs topic");
        assert_eq!(result.processing_time, Some(1.5));

        let percents: Vec<f32> = run.progress.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![5.0, 10.0, 15.0, 40.0, 55.0, 80.0]);
    }

    #[tokio::test]
    async fn latin1_bytes_on_stderr_do_not_fail_the_run() {
        let run = run_script(
            r#"
echo "Processing 1 inputs..." >&2
printf 'Processing input: caf\351.mp4\n' >&2
echo '{"success": true, "metadata": []}'
"#,
            &[],
        )
        .await;

        assert!(run.outcome.unwrap().success);
        let messages: Vec<&str> = run.progress.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(messages, vec!["Processing 1 inputs", "Reading caf\u{FFFD}.mp4"]);
    }

    #[tokio::test]
    async fn undecodable_error_line_is_kept_lossily() {
        let run = run_script(r"printf 'cannot open caf\351.mp4\n' >&2; exit 1", &[]).await;
        match run.outcome {
            Err(ProcessError::Exit { message, .. }) => assert_eq!(message, "cannot open caf\u{FFFD}.mp4"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_line_strips_line_endings() {
        assert_eq!(decode_line(b"Chunk 1/2\r\n"), "Chunk 1/2");
        assert_eq!(decode_line(b"\xff\n"), "\u{FFFD}");
    }

    #[tokio::test]
    async fn failing_run_uses_json_error_from_stderr() {
        let run = run_script(
            r#"
echo "Initializing AI Manager" >&2
echo '{"success": false, "error": "Failed to initialize AI manager"}' >&2
exit 1
"#,
            &[],
        )
        .await;

        match run.outcome {
            Err(ProcessError::Exit { status, message }) => {
                assert_eq!(status.code(), Some(1));
                assert_eq!(message, "Failed to initialize AI manager");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_run_falls_back_to_last_stderr_line() {
        let run = run_script("echo 'ModuleNotFoundError: No module named ollama' >&2\nexit 2", &[]).await;
        assert!(matches!(
            run.outcome,
            Err(ProcessError::Exit { ref message, .. }) if message == "ModuleNotFoundError: No module named ollama"
        ));
    }

    #[tokio::test]
    async fn silent_failure_names_exit_status() {
        let run = run_script("exit 3", &[]).await;
        match run.outcome {
            Err(ProcessError::Exit { message, .. }) => assert!(message.contains('3'), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_false_on_stdout_is_reported() {
        let run = run_script(r#"echo '{"success": false, "error": "No valid content items"}'"#, &[]).await;
        assert!(matches!(
            run.outcome,
            Err(ProcessError::Reported(ref m)) if m == "No valid content items"
        ));
    }

    #[tokio::test]
    async fn garbage_stdout_is_invalid_output() {
        let run = run_script("echo 'done!'", &[]).await;
        assert!(matches!(run.outcome, Err(ProcessError::InvalidOutput(_))));
    }

    #[tokio::test]
    async fn missing_interpreter_is_spawn_error() {
        let queue = QueueBuilder::new().build().unwrap();
        let runner = ProcessRunner::new("/nonexistent/python3", "generator.py");
        let (tx, rx) = oneshot::channel();
        queue
            .run(Task::from_fn("gen", Lane::Ai, "gen", move |ctx| async move {
                let _ = tx.send(runner.run_args(&[], &ctx).await);
                Ok(Value::Null)
            }))
            .await
            .unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { ref program, .. } if program == "/nonexistent/python3"));
    }

    #[tokio::test]
    async fn cancel_kills_child() {
        let file = script("echo 'Initializing AI Manager' >&2\nsleep 30\necho '{\"success\": true}'");
        let runner = ProcessRunner::new("sh", file.path()).with_cancel_poll(Duration::from_millis(20));
        let queue = QueueBuilder::new().build().unwrap();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let started_tx = Mutex::new(Some(started_tx));

        let task = Task::from_fn("gen", Lane::Ai, "gen", move |ctx| async move {
            runner.run_args(&[], &ctx).await?;
            Ok(Value::Null)
        })
        .with_progress(move |_, _| {
            if let Some(tx) = started_tx.lock().take() {
                let _ = tx.send(());
            }
        });

        let q = queue.clone();
        let waiter = tokio::spawn(async move { q.run(task).await });
        started_rx.await.unwrap();
        queue.cancel(&"gen".into());

        let err = tokio::time::timeout(Duration::from_secs(10), waiter)
            .await
            .expect("child was not killed")
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(queue.status().is_idle());
    }
}

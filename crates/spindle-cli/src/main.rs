//! spindle - run the metadata generator through the task queue.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use spindle_core::ports::{IdGenerator, SystemClock, UlidGenerator};
use spindle_core::process::{AiProvider, MetadataJob, MetadataRequest, Mode, Platform, ProcessRunner};
use spindle_core::{Lane, QueueBuilder, QueueConfig, QueueEvent, TaskId, TaskStatus, Watchdog};

#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(version, about = "Queue metadata generation runs with bounded concurrency", long_about = None)]
struct Args {
    /// Subjects, video files, transcript files or directories
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<String>,

    /// Queue config (TOML)
    #[arg(short, long, env = "SPINDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Interpreter used to run the generator
    #[arg(long, env = "SPINDLE_PYTHON", default_value = "python3")]
    python: PathBuf,

    /// Generator script
    #[arg(long, env = "SPINDLE_GENERATOR", default_value = "python/metadata_generator.py")]
    script: PathBuf,

    #[arg(long, default_value = "youtube")]
    platform: Platform,

    /// `individual` queues one run per input, `compilation` a single run
    #[arg(long, default_value = "individual")]
    mode: Mode,

    #[arg(long, default_value = "ollama")]
    ai_provider: AiProvider,

    #[arg(long)]
    ai_model: Option<String>,

    #[arg(long, env = "SPINDLE_AI_API_KEY", hide_env_values = true)]
    ai_api_key: Option<String>,

    #[arg(long, default_value = spindle_core::process::DEFAULT_AI_HOST)]
    ai_host: String,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override a lane's concurrency, e.g. `--limit ai=2`
    #[arg(long, value_name = "LANE=N", value_parser = parse_lane_limit)]
    limit: Vec<(Lane, usize)>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_lane_limit(s: &str) -> Result<(Lane, usize), String> {
    let (lane, n) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LANE=N, got '{s}'"))?;
    let lane: Lane = lane.parse().map_err(|e| format!("{e}"))?;
    let n = n
        .trim()
        .parse()
        .map_err(|e| format!("invalid limit '{n}': {e}"))?;
    Ok((lane, n))
}

impl Args {
    fn request(&self, inputs: Vec<String>, mode: Mode) -> MetadataRequest {
        let mut request = MetadataRequest::new(inputs)
            .platform(self.platform)
            .mode(mode)
            .provider(self.ai_provider)
            .host(self.ai_host.clone());
        request.ai_model = self.ai_model.clone();
        request.ai_api_key = self.ai_api_key.clone();
        request.output = self.output.clone();
        request
    }

    /// One request per input, or one for all of them.
    fn requests(&self) -> Vec<MetadataRequest> {
        match self.mode {
            Mode::Individual => self
                .inputs
                .iter()
                .map(|input| self.request(vec![input.clone()], Mode::Individual))
                .collect(),
            Mode::Compilation => vec![self.request(self.inputs.clone(), Mode::Compilation)],
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => QueueConfig::from_toml_file(path)?,
        None => QueueConfig::default(),
    }
    .apply_env()?;

    let requests = args.requests();
    for request in &requests {
        request.validate()?;
    }

    let queue = args
        .limit
        .iter()
        .fold(QueueBuilder::new().config(config), |builder, &(lane, n)| {
            builder.lane_limit(lane, n)
        })
        .build()?;
    let watchdog = Watchdog::spawn(queue.clone());
    let mut events = queue.subscribe();

    let runner = Arc::new(ProcessRunner::new(&args.python, &args.script));
    let ids = UlidGenerator::new(SystemClock);

    let mut outstanding: HashSet<TaskId> = HashSet::new();
    for request in requests {
        let name = request.inputs.join(", ");
        let task = MetadataJob::new(Arc::clone(&runner), request)
            .into_task(ids.generate_task_id(), name.clone())
            .with_progress(move |percent, message| {
                tracing::info!(task = %name, percent, "{message}");
            });
        outstanding.insert(queue.enqueue(task));
    }
    tracing::info!(tasks = outstanding.len(), "queued");

    let mut failures = 0usize;
    let mut interrupted = false;
    while !outstanding.is_empty() {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                tracing::warn!("interrupted; cancelling queued and running work");
                interrupted = true;
                queue.clear_all();
                continue;
            }
        };
        let Some(event) = event else { break };

        println!("{}", serde_json::to_string(&event)?);
        match &event {
            QueueEvent::TaskCompleted { task_id, .. } => {
                outstanding.remove(task_id);
            }
            QueueEvent::TaskFailed {
                task_id, status, ..
            } => {
                outstanding.remove(task_id);
                if *status == TaskStatus::Failed {
                    failures += 1;
                }
            }
            QueueEvent::TaskStarted { .. } | QueueEvent::TaskTimeout { .. } => {}
        }
    }

    watchdog.shutdown_and_join().await;

    if failures > 0 || interrupted {
        tracing::warn!(failures, interrupted, "finished with problems");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_mode_splits_inputs() {
        let args = Args::parse_from(["spindle", "a.mp4", "b.txt"]);
        let requests = args.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].inputs, vec!["b.txt"]);
        assert_eq!(requests[0].ai_host, "http://localhost:11434");
    }

    #[test]
    fn compilation_mode_keeps_inputs_together() {
        let args = Args::parse_from([
            "spindle",
            "--mode",
            "compilation",
            "--ai-provider",
            "openai",
            "--ai-api-key",
            "sk-test",
            "a.mp4",
            "b.txt",
        ]);
        let requests = args.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].inputs, vec!["a.mp4", "b.txt"]);
        assert_eq!(requests[0].mode, Mode::Compilation);
        assert!(requests[0].validate().is_ok());
    }

    #[test]
    fn lane_limits_parse_from_flags() {
        let args = Args::parse_from(["spindle", "--limit", "ai=2", "--limit", "MAIN=3", "x"]);
        assert_eq!(args.limit, vec![(Lane::Ai, 2), (Lane::Main, 3)]);
        assert!(Args::try_parse_from(["spindle", "--limit", "gpu=2", "x"]).is_err());
        assert!(Args::try_parse_from(["spindle", "--limit", "ai", "x"]).is_err());
    }

    #[test]
    fn blank_input_fails_validation() {
        let args = Args::parse_from(["spindle", "a.mp4", "   "]);
        let requests = args.requests();
        assert!(requests[0].validate().is_ok());
        assert!(requests[1].validate().is_err());
    }

    #[test]
    fn rejects_unknown_platform() {
        assert!(Args::try_parse_from(["spindle", "--platform", "tiktok", "x"]).is_err());
    }
}

//! Command line of the metadata generator.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::ProcessError;

pub const DEFAULT_AI_HOST: &str = "http://localhost:11434";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownChoice {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Youtube,
    Spreaker,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Spreaker => "spreaker",
        }
    }
}

impl FromStr for Platform {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "spreaker" => Ok(Platform::Spreaker),
            _ => Err(UnknownChoice {
                kind: "platform",
                value: s.to_string(),
                expected: "youtube, spreaker",
            }),
        }
    }
}

/// `Individual` produces one metadata set per input, `Compilation` one set
/// for all inputs together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Individual,
    Compilation,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Individual => "individual",
            Mode::Compilation => "compilation",
        }
    }
}

impl FromStr for Mode {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Mode::Individual),
            "compilation" => Ok(Mode::Compilation),
            _ => Err(UnknownChoice {
                kind: "mode",
                value: s.to_string(),
                expected: "individual, compilation",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiProvider {
    #[default]
    Ollama,
    Openai,
    Claude,
}

impl AiProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            AiProvider::Ollama => "ollama",
            AiProvider::Openai => "openai",
            AiProvider::Claude => "claude",
        }
    }

    /// Hosted providers need a key, a local Ollama does not.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, AiProvider::Ollama)
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiProvider {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(AiProvider::Ollama),
            "openai" => Ok(AiProvider::Openai),
            "claude" => Ok(AiProvider::Claude),
            _ => Err(UnknownChoice {
                kind: "AI provider",
                value: s.to_string(),
                expected: "ollama, openai, claude",
            }),
        }
    }
}

/// Everything the generator needs for one run.
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataRequest {
    /// Subjects, video files, transcript files or directories.
    pub inputs: Vec<String>,
    pub platform: Platform,
    pub mode: Mode,
    pub ai_provider: AiProvider,
    pub ai_model: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_host: String,
    pub output: Option<PathBuf>,
}

impl MetadataRequest {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            platform: Platform::default(),
            mode: Mode::default(),
            ai_provider: AiProvider::default(),
            ai_model: None,
            ai_api_key: None,
            ai_host: DEFAULT_AI_HOST.to_string(),
            output: None,
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn provider(mut self, provider: AiProvider) -> Self {
        self.ai_provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.ai_model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.ai_api_key = Some(key.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.ai_host = host.into();
        self
    }

    pub fn output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.inputs.iter().all(|i| i.trim().is_empty()) {
            return Err(ProcessError::EmptyInputs);
        }
        let has_key = self.ai_api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if self.ai_provider.requires_api_key() && !has_key {
            return Err(ProcessError::MissingApiKey(self.ai_provider));
        }
        Ok(())
    }

    /// Arguments after the script path.
    pub fn to_args(&self) -> Result<Vec<String>, ProcessError> {
        self.validate()?;

        let mut args = vec!["--inputs".to_string()];
        args.extend(
            self.inputs
                .iter()
                .filter(|i| !i.trim().is_empty())
                .cloned(),
        );
        args.extend([
            "--platform".to_string(),
            self.platform.as_str().to_string(),
            "--mode".to_string(),
            self.mode.as_str().to_string(),
            "--ai-provider".to_string(),
            self.ai_provider.as_str().to_string(),
        ]);
        if let Some(model) = &self.ai_model {
            args.push("--ai-model".to_string());
            args.push(model.clone());
        }
        if let Some(key) = &self.ai_api_key {
            args.push("--ai-api-key".to_string());
            args.push(key.clone());
        }
        args.push("--ai-host".to_string());
        args.push(self.ai_host.clone());
        if let Some(output) = &self.output {
            args.push("--output".to_string());
            args.push(output.display().to_string());
        }
        Ok(args)
    }
}

impl fmt::Debug for MetadataRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRequest")
            .field("inputs", &self.inputs)
            .field("platform", &self.platform)
            .field("mode", &self.mode)
            .field("ai_provider", &self.ai_provider)
            .field("ai_model", &self.ai_model)
            .field("ai_api_key", &self.ai_api_key.as_ref().map(|_| "<redacted>"))
            .field("ai_host", &self.ai_host)
            .field("output", &self.output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_args() {
        let args = MetadataRequest::new(["rust ownership"]).to_args().unwrap();
        assert_eq!(
            args,
            vec![
                "--inputs",
                "rust ownership",
                "--platform",
                "youtube",
                "--mode",
                "individual",
                "--ai-provider",
                "ollama",
                "--ai-host",
                "http://localhost:11434",
            ]
        );
    }

    #[test]
    fn full_args() {
        let args = MetadataRequest::new(["a.mp4", "b.txt"])
            .platform(Platform::Spreaker)
            .mode(Mode::Compilation)
            .provider(AiProvider::Claude)
            .model("claude-sonnet")
            .api_key("sk-test")
            .output("/tmp/out")
            .to_args()
            .unwrap();

        let joined = args.join(" ");
        assert!(joined.starts_with("--inputs a.mp4 b.txt --platform spreaker --mode compilation"));
        assert!(joined.contains("--ai-provider claude --ai-model claude-sonnet --ai-api-key sk-test"));
        assert!(joined.ends_with("--output /tmp/out"));
    }

    #[test]
    fn empty_inputs_rejected() {
        let err = MetadataRequest::new(Vec::<String>::new()).to_args().unwrap_err();
        assert!(matches!(err, ProcessError::EmptyInputs));

        let err = MetadataRequest::new(["  "]).validate().unwrap_err();
        assert!(matches!(err, ProcessError::EmptyInputs));
    }

    #[rstest]
    #[case::openai(AiProvider::Openai)]
    #[case::claude(AiProvider::Claude)]
    fn hosted_providers_need_a_key(#[case] provider: AiProvider) {
        let err = MetadataRequest::new(["x"]).provider(provider).validate().unwrap_err();
        assert!(matches!(err, ProcessError::MissingApiKey(p) if p == provider));
        assert!(MetadataRequest::new(["x"]).provider(provider).api_key("k").validate().is_ok());
    }

    #[test]
    fn debug_hides_api_key() {
        let req = MetadataRequest::new(["x"]).provider(AiProvider::Openai).api_key("sk-secret");
        let shown = format!("{req:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[rstest]
    #[case::upper("YouTube", Platform::Youtube)]
    #[case::spreaker(" spreaker ", Platform::Spreaker)]
    fn platform_parses(#[case] input: &str, #[case] expected: Platform) {
        assert_eq!(input.parse::<Platform>().unwrap(), expected);
    }

    #[test]
    fn unknown_choice_lists_options() {
        let err = "gemini".parse::<AiProvider>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown AI provider 'gemini' (expected one of: ollama, openai, claude)"
        );
        assert!("batch".parse::<Mode>().is_err());
    }
}

//! Assistant invocation
//!
//! Runs the external assistant CLI once per tool call:
//!
//! ```text
//! copilot -p <prompt> --allow-all-tools --allow-all-paths --add-dir <cwd>
//! ```
//!
//! stdin is closed and stdout/stderr are captured separately. Every outcome,
//! failures included, becomes text for the caller.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use copilot_core::logging::{truncate, PREVIEW_CHARS};
use copilot_core::Config;

/// Returned when the assistant exits cleanly without printing anything
pub const NO_OUTPUT: &str = "No output produced by copilot.";

/// Classified result of one assistant run, in priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exit 0 with output on stdout
    Success(String),
    /// Exit 0, stdout empty, something on stderr
    StderrOnly(String),
    /// Exit 0 and nothing on either stream
    NoOutput,
    /// Non-zero exit; `output` is stderr, else stdout, possibly empty.
    /// Death by signal is reported as code -1.
    NonZeroExit { code: i32, output: String },
    /// The process could not be spawned or awaited
    LaunchFailed(String),
    /// The configured deadline passed; the child was killed
    TimedOut(Duration),
}

impl Outcome {
    /// Classify a finished process
    pub fn classify(code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        let stdout = stdout.trim();
        let stderr = stderr.trim();

        match code {
            Some(0) if !stdout.is_empty() => Self::Success(stdout.to_string()),
            Some(0) if !stderr.is_empty() => Self::StderrOnly(stderr.to_string()),
            Some(0) => Self::NoOutput,
            code => Self::NonZeroExit {
                code: code.unwrap_or(-1),
                output: if stderr.is_empty() { stdout } else { stderr }.to_string(),
            },
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Success(_) | Self::StderrOnly(_) | Self::NoOutput => Some(0),
            Self::NonZeroExit { code, .. } => Some(*code),
            Self::LaunchFailed(_) | Self::TimedOut(_) => None,
        }
    }

    /// Text returned to the MCP client
    pub fn into_text(self) -> String {
        match self {
            Self::Success(text) | Self::StderrOnly(text) => text,
            Self::NoOutput => NO_OUTPUT.to_string(),
            Self::NonZeroExit { code, output } => {
                let output = if output.is_empty() { "no output" } else { output.as_str() };
                format!("Copilot exited with code {}: {}", code, output)
            }
            Self::LaunchFailed(message) => format!("Error running copilot: {}", message),
            Self::TimedOut(limit) => format!("Copilot timed out after {:?}", limit),
        }
    }

    fn log(&self, duration_ms: u64) {
        match self {
            Self::Success(text) => info!(
                duration_ms,
                output_preview = %truncate(text, PREVIEW_CHARS),
                output_length = text.chars().count(),
                "Copilot execution succeeded"
            ),
            Self::StderrOnly(text) => warn!(
                duration_ms,
                output_preview = %truncate(text, PREVIEW_CHARS),
                output_length = text.chars().count(),
                "Copilot returned stderr output"
            ),
            Self::NoOutput => warn!(duration_ms, "Copilot produced no output"),
            Self::NonZeroExit { code, output } => error!(
                duration_ms,
                exit_code = *code,
                output_preview = %truncate(output, PREVIEW_CHARS),
                output_length = output.chars().count(),
                "Copilot returned a non-zero exit code"
            ),
            Self::LaunchFailed(message) => error!(
                duration_ms,
                error = %message,
                "Copilot execution failed"
            ),
            Self::TimedOut(limit) => error!(
                duration_ms,
                timeout_ms = limit.as_millis() as u64,
                "Copilot timed out"
            ),
        }
    }
}

/// One finished invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub output: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Runs the assistant CLI
#[derive(Debug, Clone)]
pub struct Assistant {
    command: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl Assistant {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            timeout: None,
        }
    }

    /// Build from config; the working directory defaults to the process cwd
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        let working_dir = match &config.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(Self::new(config.assistant_command.clone(), working_dir).with_timeout(config.timeout()))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Command-line arguments for one prompt
    pub fn args(&self, prompt: &str) -> Vec<String> {
        vec![
            "-p".to_string(),
            prompt.to_string(),
            "--allow-all-tools".to_string(),
            "--allow-all-paths".to_string(),
            "--add-dir".to_string(),
            self.working_dir.display().to_string(),
        ]
    }

    /// Run the assistant with a rendered prompt. Never fails: errors are
    /// returned as text and logged.
    pub async fn invoke(&self, prompt: &str) -> Invocation {
        let start = Instant::now();
        debug!(
            prompt_preview = %truncate(prompt, PREVIEW_CHARS),
            prompt_length = prompt.chars().count(),
            "Running copilot with prompt"
        );

        let outcome = self.run(prompt).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        outcome.log(duration_ms);

        Invocation {
            exit_code: outcome.exit_code(),
            output: outcome.into_text(),
            duration_ms,
        }
    }

    async fn run(&self, prompt: &str) -> Outcome {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.args(prompt))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => return Outcome::TimedOut(limit),
            },
            None => cmd.output().await,
        };

        match result {
            Ok(output) => Outcome::classify(
                output.status.code(),
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
            ),
            Err(e) => Outcome::LaunchFailed(e.to_string()),
        }
    }
}

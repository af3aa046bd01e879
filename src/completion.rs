//! The text-completion collaborator.
//!
//! The pipeline never talks to a model service directly. It hands a
//! [`CompletionRequest`] to a [`TextCompletion`] implementation and gets a
//! single text blob back.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

/// Pipeline stage that issues a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Optional model-driven key-file selection
    FileSelection,
    /// Structured codebase analysis
    CodebaseAnalysis,
    /// Developer tool descriptors
    ToolGeneration,
    /// Dockerfile text
    Dockerfile,
    /// Markdown documentation
    Documentation,
    /// Deployable tool-server files
    ServerTemplate,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::FileSelection,
        Self::CodebaseAnalysis,
        Self::ToolGeneration,
        Self::Dockerfile,
        Self::Documentation,
        Self::ServerTemplate,
    ];

    /// Human-readable stage name used in errors and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FileSelection => "file selection",
            Self::CodebaseAnalysis => "codebase analysis",
            Self::ToolGeneration => "tool generation",
            Self::Dockerfile => "dockerfile generation",
            Self::Documentation => "documentation generation",
            Self::ServerTemplate => "server template generation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One call to the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Issuing stage
    pub stage: Stage,
    /// System prompt
    pub system: String,
    /// User prompt
    pub user: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Model identifier, when the caller configured one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Produces a raw text completion for a prompt pair.
///
/// The returned text may contain markdown fences or prose around the payload;
/// callers run it through the extractors.
#[async_trait::async_trait]
pub trait TextCompletion: Send + Sync {
    /// Runs one completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Runs an external command per completion.
///
/// The request is written to the command's stdin as one JSON document; the
/// command's stdout is the completion text. A non-zero exit status is a
/// [`Error::Completion`].
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandCompletion {
    /// Creates an adapter for the given program.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Appends arguments passed on every invocation.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Fails a completion that runs longer than `timeout`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn run(&self, request: &CompletionRequest) -> Result<String> {
        let stage = request.stage.label();
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::completion(
                    stage,
                    format!("failed to start '{}': {e}", self.program.display()),
                )
            })?;

        // Written concurrently with reading stdout so a command that echoes
        // large input cannot fill both pipes and stall.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                stdin.write_all(&payload).await
                // stdin drops here, closing the pipe
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::completion(stage, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::completion(
                stage,
                format!("command exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The command may legitimately exit without reading its input.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => {
                    return Err(Error::completion(
                        stage,
                        format!("failed to write request: {e}"),
                    ));
                }
                Err(e) => return Err(Error::completion(stage, e.to_string())),
            }
        }

        trace!("Completion command wrote {} bytes", output.stdout.len());
        String::from_utf8(output.stdout)
            .map_err(|_| Error::completion(stage, "command output is not valid UTF-8"))
    }
}

#[async_trait::async_trait]
impl TextCompletion for CommandCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(
            "Running '{}' for {}",
            self.program.display(),
            request.stage
        );
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(request))
                .await
                .map_err(|_| {
                    Error::completion(
                        request.stage.label(),
                        format!("command timed out after {}s", limit.as_secs()),
                    )
                })?,
            None => self.run(request).await,
        }
    }
}

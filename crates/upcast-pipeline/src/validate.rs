//! Candidate output validation

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use upcast_indexer::{FileType, check_syntax};

/// Lines of command output kept in a validation error.
const ERROR_TAIL_LINES: usize = 20;

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub error: Option<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self { valid: true, error: None }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }

    /// The error message, or a generic one for an unexplained rejection.
    pub fn message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "validation failed".to_string())
    }
}

/// Decides whether a transformer output is acceptable.
#[async_trait::async_trait]
pub trait Validator: Send + Sync {
    /// Full check of a complete artifact.
    async fn validate(&self, path: &Path, content: &str) -> Validation;

    /// Cheap structural check, used for chunk outputs.
    async fn validate_syntax_only(&self, path: &Path, content: &str) -> Validation;
}

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("validation command is empty")]
    EmptyCommand,
}

async fn syntax_check(path: &Path, content: &str) -> Validation {
    let file_type = FileType::from_path(path);
    let content = content.to_string();
    match tokio::task::spawn_blocking(move || check_syntax(&content, file_type)).await {
        Ok(Ok(())) => Validation::ok(),
        Ok(Err(e)) => Validation::invalid(e.to_string()),
        Err(e) => Validation::invalid(format!("syntax check aborted: {}", e)),
    }
}

/// Parses the candidate with the tree-sitter grammar of the item's language.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxValidator;

#[async_trait::async_trait]
impl Validator for SyntaxValidator {
    async fn validate(&self, path: &Path, content: &str) -> Validation {
        syntax_check(path, content).await
    }

    async fn validate_syntax_only(&self, path: &Path, content: &str) -> Validation {
        syntax_check(path, content).await
    }
}

/// Syntax check, then an external command run against a temporary copy of
/// the candidate. A `{file}` argument is replaced with the copy's path;
/// without one the path is appended.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(command: &str) -> Result<Self, ValidatorError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(ValidatorError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout: Duration::from_secs(120),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn arguments(&self, file: &Path) -> Vec<String> {
        let file = file.display().to_string();
        let mut args: Vec<String> = self.args.iter().map(|a| a.replace("{file}", &file)).collect();
        if !self.args.iter().any(|a| a.contains("{file}")) {
            args.push(file);
        }
        args
    }

    async fn run(&self, path: &Path, content: &str) -> Validation {
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let scratch = match tempfile::Builder::new().prefix("upcast-").suffix(&suffix).tempfile() {
            Ok(file) => file,
            Err(e) => return Validation::invalid(format!("could not create scratch file: {}", e)),
        };
        if let Err(e) = tokio::fs::write(scratch.path(), content).await {
            return Validation::invalid(format!("could not write scratch file: {}", e));
        }

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(self.arguments(scratch.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir(path) {
            command.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Validation::invalid(format!("could not run `{}`: {}", self.program, e)),
            Err(_) => {
                return Validation::invalid(format!(
                    "`{}` timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ));
            }
        };

        if output.status.success() {
            return Validation::ok();
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = if stderr.trim().is_empty() { stdout } else { stderr };
        Validation::invalid(format!("`{}` exited with {}:\n{}", self.program, output.status, tail(&text)))
    }
}

#[async_trait::async_trait]
impl Validator for CommandValidator {
    async fn validate(&self, path: &Path, content: &str) -> Validation {
        let syntax = syntax_check(path, content).await;
        if !syntax.valid {
            return syntax;
        }
        self.run(path, content).await
    }

    async fn validate_syntax_only(&self, path: &Path, content: &str) -> Validation {
        syntax_check(path, content).await
    }
}

fn working_dir(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    parent.is_dir().then(|| parent.to_path_buf())
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

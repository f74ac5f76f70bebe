//! External conversion commands.
//!
//! Every converter the gateway uses (image to PDF, text to PDF, PDFs to fax
//! TIFF, ...) is an argument-vector command built from a [`CommandTemplate`]
//! and executed through the [`Converter`] capability. The subprocess
//! implementation enforces a timeout and treats "exited zero but wrote
//! nothing" as a failure.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ConvertError;

/// Maximum stderr kept for error messages.
const MAX_STDERR_SIZE: usize = 4 * 1024;

/// Default converter timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// An argument vector with `{placeholder}` slots.
///
/// - `{input}` is the first input path
/// - `{inputs}` as a whole argument expands to one argument per input
/// - `{output}` is the output path
/// - any other `{name}` is looked up in the job parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a shell-style template string. `None` on unbalanced quoting or
    /// an empty command.
    pub fn parse(template: &str) -> Option<Self> {
        let args = shlex::split(template)?;
        if args.is_empty() {
            return None;
        }
        Some(Self { args })
    }

    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Build a job for `inputs` → `output`.
    pub fn job(
        &self,
        inputs: Vec<PathBuf>,
        output: PathBuf,
        params: &[(&str, &str)],
    ) -> ConversionJob {
        let first_input = inputs
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let output_str = output.display().to_string();

        let mut command = Vec::with_capacity(self.args.len() + inputs.len());
        for arg in &self.args {
            if arg == "{inputs}" {
                command.extend(inputs.iter().map(|p| p.display().to_string()));
                continue;
            }
            let mut rendered = arg.replace("{input}", &first_input).replace("{output}", &output_str);
            for (name, value) in params {
                rendered = rendered.replace(&format!("{{{name}}}"), value);
            }
            command.push(rendered);
        }

        ConversionJob {
            inputs,
            output,
            command,
        }
    }
}

/// One external conversion: inputs, output, and the command that links them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub command: Vec<String>,
}

impl ConversionJob {
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command.join(" "))
    }
}

/// Capability to turn a job's inputs into its output.
///
/// The pipeline only depends on this trait, so in-process codecs (or test
/// doubles) can stand in for subprocesses.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn run(&self, job: &ConversionJob) -> Result<(), ConvertError>;
}

/// Runs jobs as child processes.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    timeout: Duration,
}

impl CommandConverter {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for CommandConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for CommandConverter {
    async fn run(&self, job: &ConversionJob) -> Result<(), ConvertError> {
        if job.inputs.is_empty() {
            return Err(ConvertError::EmptyInput);
        }
        let Some((program, args)) = job.command.split_first() else {
            return Err(ConvertError::EmptyCommand);
        };

        tracing::debug!(command = %job, "Running converter");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConvertError::Timeout {
                    program: program.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(ConvertError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: truncate_stderr(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        ensure_output(program, &job.output).await
    }
}

/// A zero exit status is not enough; the output file must exist and be
/// non-empty.
pub async fn ensure_output(program: &str, output: &Path) -> Result<(), ConvertError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(ConvertError::MissingOutput {
            program: program.to_string(),
            output: output.to_path_buf(),
        }),
    }
}

/// Keep the tail of stderr, which is where converters put the actual error.
fn truncate_stderr(s: &str) -> String {
    let s = s.trim();
    if s.len() <= MAX_STDERR_SIZE {
        return s.to_string();
    }
    let mut start = s.len() - MAX_STDERR_SIZE;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}

//! Error types for faxgate.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for one gateway invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Rasterization failed: {0}")]
    Raster(ConvertError),

    #[error("Call-file error: {0}")]
    CallFile(#[from] CallFileError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit status for the process, in the spirit of `sysexits.h`.
    ///
    /// MTAs treat 75 as "try again later" and everything else as a bounce.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Message(_) => 65,
            Self::Config(_) => 78,
            Self::Mail(MailError::MissingSender) => 67,
            _ => 75,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Inbound message errors.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message is empty")]
    Empty,

    #[error("Message could not be parsed as MIME")]
    Unparseable,
}

/// Errors from running one conversion job.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Converter {program} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Converter {program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Converter {program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("Converter {program} produced no output at {}", output.display())]
    MissingOutput { program: String, output: PathBuf },

    #[error("Conversion job has no input files")]
    EmptyInput,

    #[error("Conversion command template is empty")]
    EmptyCommand,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Call-file serialization and commit errors.
#[derive(Debug, thiserror::Error)]
pub enum CallFileError {
    #[error("Failed to commit call-file to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed call-file line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Transport(String),

    #[error("Message has neither a Reply-To nor a From address")]
    MissingSender,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;

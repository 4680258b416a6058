use std::fmt;
use thiserror::Error;

use crate::jdwp::JdwpError;

/// Step of the debug-server installation (or symbol collection) that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    CreateDir,
    Push,
    Copy,
    Permission,
    Pull,
    LocalCopy,
}

impl TransferStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStep::CreateDir => "create directory",
            TransferStep::Push => "push",
            TransferStep::Copy => "copy",
            TransferStep::Permission => "chmod",
            TransferStep::Pull => "pull",
            TransferStep::LocalCopy => "local copy",
        }
    }
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of the remote debug-server run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStage {
    /// Creating the log directory and truncating the log file.
    Prepare,
    /// The debug server itself.
    Run,
}

impl fmt::Display for ServerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStage::Prepare => f.write_str("log preparation"),
            ServerStage::Run => f.write_str("server process"),
        }
    }
}

/// Error taxonomy used when reporting a failed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Discovery,
    Transfer,
    Forward,
    Protocol,
    Runtime,
    Communication,
    Configuration,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("DEVICE_NOT_FOUND: {0}")]
    DeviceNotFound(String),

    #[error("PROCESS_NOT_FOUND: No process for '{package}' appeared within {timeout_ms}ms.")]
    ProcessTimeout { package: String, timeout_ms: u64 },

    #[error("TRANSFER_FAILED: {step} failed: {reason}")]
    Transfer { step: TransferStep, reason: String },

    #[error("FORWARD_FAILED: {spec}: {reason}")]
    Forward { spec: String, reason: String },

    #[error("PROTOCOL_ERROR: {0}")]
    Protocol(#[from] JdwpError),

    #[error("DEBUG_SERVER_STOPPED: {stage} ended: {reason}")]
    DebugServer { stage: ServerStage, reason: String },

    #[error("LOG_STREAM_STOPPED: {0}")]
    LogStream(String),

    #[error("COMMAND_FAILED: `{command}`: {output}")]
    Command { command: String, output: String },

    #[error("LAUNCH_FAILED: {0}")]
    Launch(String),

    #[error("SDK_NOT_FOUND: {0}")]
    Sdk(String),

    #[error("MANIFEST_INVALID: {0}")]
    Manifest(String),

    #[error("BUILD_FAILED: {0}")]
    Build(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeviceNotFound(_) | Error::ProcessTimeout { .. } => ErrorKind::Discovery,
            Error::Transfer { .. } => ErrorKind::Transfer,
            Error::Forward { .. } => ErrorKind::Forward,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::DebugServer { .. } | Error::LogStream(_) => ErrorKind::Runtime,
            Error::Command { .. } | Error::Launch(_) | Error::Io(_) => ErrorKind::Communication,
            Error::Sdk(_) | Error::Manifest(_) | Error::Build(_) | Error::Json(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Collapse a failure into an installation error for `step`, keeping the
    /// command output when there is one.
    pub(crate) fn into_transfer(self, step: TransferStep) -> Error {
        let reason = match self {
            Error::Command { output, .. } if !output.trim().is_empty() => output.trim().to_string(),
            other => other.to_string(),
        };
        Error::Transfer { step, reason }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

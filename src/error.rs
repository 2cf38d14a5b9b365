//! Error types shared by the runner, the engines and the merge pipeline.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code, stdout and stderr captured from one script invocation.
///
/// `exit_code` is -1 when the process never produced one (spawn failure,
/// timeout kill, missing interpreter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn synthetic(message: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: message.into(),
        }
    }
}

/// Diagnostic payload attached to every engine-level failure.
pub type Diagnostics = ScriptOutput;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("no script interpreter was found")]
    InterpreterNotFound,

    #[error("script exceeded timeout ({timeout:?})")]
    Timeout {
        timeout: Duration,
        output: ScriptOutput,
    },

    #[error("script exited with code {}", .0.exit_code)]
    NonZeroExit(ScriptOutput),

    #[error("failed to run script interpreter: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("waiting for script interpreter was interrupted: {0}")]
    Interrupted(String),
}

impl ScriptError {
    /// The captured triple, synthesized for failures that never produced one.
    pub fn output(&self) -> ScriptOutput {
        match self {
            Self::InterpreterNotFound => ScriptOutput::synthetic(self.to_string()),
            Self::Timeout { output, .. } => {
                let mut out = output.clone();
                if out.stderr.trim().is_empty() {
                    out.stderr = self.to_string();
                }
                out.exit_code = -1;
                out
            }
            Self::NonZeroExit(output) => output.clone(),
            Self::Spawn { source } => ScriptOutput::synthetic(source.to_string()),
            Self::Interrupted(msg) => ScriptOutput::synthetic(msg.clone()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("{engine} is unavailable: {reason}")]
    CapabilityUnavailable {
        engine: String,
        reason: String,
        diagnostics: Diagnostics,
    },

    #[error("{engine} timed out after {timeout:?} converting {}", .input.display())]
    Timeout {
        engine: String,
        input: PathBuf,
        timeout: Duration,
        diagnostics: Diagnostics,
    },

    #[error("{engine} failed converting {} (exit code {})", .input.display(), .diagnostics.exit_code)]
    ExecutionFailed {
        engine: String,
        input: PathBuf,
        diagnostics: Diagnostics,
    },

    #[error("{engine} produced no output for {} (expected {})", .input.display(), .output.display())]
    OutputMissing {
        engine: String,
        input: PathBuf,
        output: PathBuf,
        diagnostics: Diagnostics,
    },

    #[error("{engine} returned {actual} converted files for {expected} inputs")]
    CountMismatch {
        engine: String,
        expected: usize,
        actual: usize,
    },

    #[error("{engine} does not support {operation}: {}", .input.display())]
    UnsupportedOperation {
        engine: String,
        operation: &'static str,
        input: PathBuf,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConversionError {
    /// The input the failure is attributed to, when there is one.
    pub fn failed_input(&self) -> Option<&std::path::Path> {
        match self {
            Self::Timeout { input, .. }
            | Self::ExecutionFailed { input, .. }
            | Self::OutputMissing { input, .. }
            | Self::UnsupportedOperation { input, .. } => Some(input),
            _ => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::CapabilityUnavailable { diagnostics, .. }
            | Self::Timeout { diagnostics, .. }
            | Self::ExecutionFailed { diagnostics, .. }
            | Self::OutputMissing { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("nothing to merge: no checked, present items")]
    NothingToMerge,

    #[error("invalid output file name {name:?}: {reason}")]
    InvalidOutputName { name: String, reason: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("merge cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Assembly {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot embed image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("not a word-processing package {}: {reason}", .path.display())]
    Package { path: PathBuf, reason: String },
}

impl MergeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn assembly(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Assembly {
            context: context.into(),
            source,
        }
    }
}

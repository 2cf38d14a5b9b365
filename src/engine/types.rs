use crate::error::Diagnostics;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Primary,
    Secondary,
}

/// Save-format codes in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatPriority {
    pub primary: i32,
    pub fallback: i32,
}

/// Everything that distinguishes one automation product from another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineDescriptor {
    pub kind: EngineKind,
    pub name: String,
    pub prog_id: String,
    pub formats: FormatPriority,
    pub supports_pdf: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub engine: String,
    pub available: bool,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProbeResult {
    pub fn available(engine: &str, diag: Diagnostics) -> Self {
        Self {
            engine: engine.to_string(),
            available: true,
            message: "available".into(),
            stdout: diag.stdout,
            stderr: diag.stderr,
            exit_code: diag.exit_code,
        }
    }

    pub fn unavailable(engine: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            engine: engine.to_string(),
            available: false,
            stderr: message.clone(),
            message,
            stdout: String::new(),
            exit_code: -1,
        }
    }

    pub fn failed(engine: &str, message: impl Into<String>, diag: Diagnostics) -> Self {
        Self {
            engine: engine.to_string(),
            available: false,
            message: message.into(),
            stdout: diag.stdout,
            stderr: diag.stderr,
            exit_code: diag.exit_code,
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

/// Result of one batch call: `outputs[i]` is the converted form of `inputs[i]`.
#[derive(Debug, Clone, Default)]
pub struct ConversionBatch {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub temp_dir: PathBuf,
}

impl ConversionBatch {
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

pub mod com;
pub mod lock;
pub mod types;

use crate::error::ConversionError;
use std::path::{Path, PathBuf};

pub use com::ComEngine;
pub use lock::{SessionCoordinator, SessionGuard};
pub use types::{ConversionBatch, EngineDescriptor, EngineKind, FormatPriority, ProbeResult};

/// An office-automation product able to turn legacy documents (and possibly
/// PDFs) into word-processing XML packages.
pub trait ConversionEngine: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn supports_pdf(&self) -> bool {
        self.descriptor().supports_pdf
    }

    /// Capability check, cached on the instance until the TTL lapses or
    /// `force_refresh` is set.
    fn probe(&self, force_refresh: bool) -> ProbeResult;

    /// Converts every input in one automation session. On success the batch
    /// holds exactly one output per input, in input order.
    fn convert_batch(
        &self,
        inputs: &[PathBuf],
        temp_dir: &Path,
    ) -> Result<ConversionBatch, ConversionError>;

    fn convert_pdf(&self, pdf: &Path, temp_dir: &Path) -> Result<PathBuf, ConversionError>;

    fn convert_one(&self, input: &Path, temp_dir: &Path) -> Result<PathBuf, ConversionError> {
        let batch = self.convert_batch(&[input.to_path_buf()], temp_dir)?;
        batch
            .outputs
            .into_iter()
            .next()
            .ok_or_else(|| ConversionError::CountMismatch {
                engine: self.name().to_string(),
                expected: 1,
                actual: 0,
            })
    }
}

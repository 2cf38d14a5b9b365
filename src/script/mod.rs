pub mod builder;
pub mod runner;

pub use builder::{
    failed_index, ComAutomationScripts, ConversionJob, PsLiteral, ScriptBuilder, ScriptStrategy,
    MARKER, PDF_SAVE_ATTEMPTS,
};
pub use runner::{resolve_interpreter, PowerShellRunner, ScriptRunner};

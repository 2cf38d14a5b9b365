use super::{ConversionBatch, ConversionEngine, EngineDescriptor, ProbeResult, SessionCoordinator};
use crate::cache::TtlCache;
use crate::config::EngineTimeouts;
use crate::error::{ConversionError, Diagnostics, ScriptError};
use crate::script::{failed_index, ComAutomationScripts, ConversionJob, ScriptRunner, ScriptStrategy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One office-automation product driven through generated scripts.
///
/// Products differ only by their [`EngineDescriptor`]; the session
/// coordinator is shared by every engine in the process.
pub struct ComEngine {
    descriptor: EngineDescriptor,
    runner: Arc<dyn ScriptRunner>,
    sessions: Arc<SessionCoordinator>,
    scripts: Box<dyn ScriptStrategy>,
    timeouts: EngineTimeouts,
    probe_cache: TtlCache<ProbeResult>,
}

impl ComEngine {
    pub fn new(
        descriptor: EngineDescriptor,
        runner: Arc<dyn ScriptRunner>,
        sessions: Arc<SessionCoordinator>,
        timeouts: EngineTimeouts,
        probe_ttl: Duration,
    ) -> Self {
        Self {
            descriptor,
            runner,
            sessions,
            scripts: Box::new(ComAutomationScripts),
            timeouts,
            probe_cache: TtlCache::new(probe_ttl),
        }
    }

    pub fn with_scripts(mut self, scripts: Box<dyn ScriptStrategy>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Last probe result without triggering a new probe.
    pub fn last_probe(&self) -> Option<ProbeResult> {
        self.probe_cache.peek().map(|s| s.value.clone())
    }

    fn run_probe(&self) -> ProbeResult {
        let name = self.descriptor.name.as_str();
        if !self.runner.host_supported() {
            return ProbeResult::unavailable(name, "automation requires a Windows host");
        }
        if self.runner.interpreter().is_none() {
            return ProbeResult::unavailable(name, "no script interpreter found");
        }

        let script = self.scripts.probe(&self.descriptor);
        let result = {
            let _session = self.sessions.acquire(name);
            self.runner.run_script(&script, self.timeouts.probe)
        };
        match result {
            Ok(out) => {
                debug!(engine = name, "probe ok");
                ProbeResult::available(name, out)
            }
            Err(err) => {
                warn!(engine = name, "probe failed: {err}");
                ProbeResult::failed(name, format!("automation probe failed: {err}"), err.output())
            }
        }
    }

    fn require_available(&self, input: &Path) -> Result<(), ConversionError> {
        let probe = self.probe(false);
        if probe.available {
            return Ok(());
        }
        Err(ConversionError::CapabilityUnavailable {
            engine: self.descriptor.name.clone(),
            reason: format!("{} (needed for {})", probe.message, input.display()),
            diagnostics: probe.diagnostics(),
        })
    }

    fn script_failure(&self, err: ScriptError, input: PathBuf) -> ConversionError {
        let engine = self.descriptor.name.clone();
        let diagnostics = err.output();
        match err {
            ScriptError::InterpreterNotFound => ConversionError::CapabilityUnavailable {
                engine,
                reason: "no script interpreter found".into(),
                diagnostics,
            },
            ScriptError::Timeout { timeout, .. } => ConversionError::Timeout {
                engine,
                input,
                timeout,
                diagnostics,
            },
            _ => ConversionError::ExecutionFailed {
                engine,
                input,
                diagnostics,
            },
        }
    }
}

impl ConversionEngine for ComEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn probe(&self, force_refresh: bool) -> ProbeResult {
        self.probe_cache
            .get_or_refresh(force_refresh, || self.run_probe())
            .value
            .clone()
    }

    fn convert_batch(
        &self,
        inputs: &[PathBuf],
        temp_dir: &Path,
    ) -> Result<ConversionBatch, ConversionError> {
        let Some(first) = inputs.first() else {
            return Ok(ConversionBatch {
                temp_dir: temp_dir.to_path_buf(),
                ..Default::default()
            });
        };
        self.require_available(first)?;
        std::fs::create_dir_all(temp_dir).map_err(|e| {
            ConversionError::io(format!("create temp dir {}", temp_dir.display()), e)
        })?;

        let jobs: Vec<ConversionJob> = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| ConversionJob {
                input: input.clone(),
                output: temp_dir.join(output_name(i, input)),
            })
            .collect();
        let script = self.scripts.batch(&self.descriptor, &jobs);

        info!(
            engine = %self.descriptor.name,
            count = jobs.len(),
            "converting legacy documents"
        );
        let result = {
            let _session = self.sessions.acquire(&self.descriptor.name);
            self.runner.run_script(&script, self.timeouts.batch)
        };

        let verified = match result {
            Ok(out) => verify_outputs(&self.descriptor.name, &jobs, out),
            Err(err) => {
                let failing = attribute_failure(&jobs, &err.output().stderr);
                Err(self.script_failure(err, failing))
            }
        };

        match verified {
            Ok(outputs) => Ok(ConversionBatch {
                inputs: inputs.to_vec(),
                outputs,
                temp_dir: temp_dir.to_path_buf(),
            }),
            Err(err) => {
                discard_outputs(&jobs);
                Err(err)
            }
        }
    }

    fn convert_pdf(&self, pdf: &Path, temp_dir: &Path) -> Result<PathBuf, ConversionError> {
        if !self.descriptor.supports_pdf {
            return Err(ConversionError::UnsupportedOperation {
                engine: self.descriptor.name.clone(),
                operation: "PDF conversion",
                input: pdf.to_path_buf(),
            });
        }
        self.require_available(pdf)?;
        std::fs::create_dir_all(temp_dir).map_err(|e| {
            ConversionError::io(format!("create temp dir {}", temp_dir.display()), e)
        })?;

        let job = ConversionJob {
            input: pdf.to_path_buf(),
            output: temp_dir.join(output_name(0, pdf)),
        };
        let script = self.scripts.pdf(&self.descriptor, &job);

        info!(engine = %self.descriptor.name, input = %pdf.display(), "converting PDF");
        let result = {
            let _session = self.sessions.acquire(&self.descriptor.name);
            self.runner.run_script(&script, self.timeouts.pdf)
        };

        let jobs = std::slice::from_ref(&job);
        let verified = match result {
            Ok(out) => verify_outputs(&self.descriptor.name, jobs, out),
            Err(err) => Err(self.script_failure(err, pdf.to_path_buf())),
        };
        match verified {
            Ok(mut outputs) => outputs.pop().ok_or_else(|| ConversionError::CountMismatch {
                engine: self.descriptor.name.clone(),
                expected: 1,
                actual: 0,
            }),
            Err(err) => {
                discard_outputs(jobs);
                Err(err)
            }
        }
    }
}

/// `{NNN}_{stem}_{uuid}.docx`, 1-based so listings sort in input order.
pub fn output_name(index: usize, input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    format!("{:03}_{}_{}.docx", index + 1, stem, Uuid::new_v4())
}

/// Every job must have left its output file; the first one that did not is
/// reported.
fn verify_outputs(
    engine: &str,
    jobs: &[ConversionJob],
    out: Diagnostics,
) -> Result<Vec<PathBuf>, ConversionError> {
    if let Some(missing) = jobs.iter().find(|j| !j.output.is_file()) {
        return Err(ConversionError::OutputMissing {
            engine: engine.to_string(),
            input: missing.input.clone(),
            output: missing.output.clone(),
            diagnostics: out,
        });
    }
    Ok(jobs.iter().map(|j| j.output.clone()).collect())
}

/// Names the input a failed batch died on: the script's own marker first,
/// then the first job without output, then the first job.
fn attribute_failure(jobs: &[ConversionJob], stderr: &str) -> PathBuf {
    failed_index(stderr)
        .and_then(|n| jobs.get(n - 1))
        .or_else(|| jobs.iter().find(|j| !j.output.is_file()))
        .or_else(|| jobs.first())
        .map(|j| j.input.clone())
        .unwrap_or_default()
}

fn discard_outputs(jobs: &[ConversionJob]) {
    for job in jobs {
        if job.output.exists() {
            if let Err(err) = std::fs::remove_file(&job.output) {
                debug!("removing partial output {}: {err}", job.output.display());
            }
        }
    }
}

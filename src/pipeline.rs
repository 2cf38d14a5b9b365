use crate::{
    config::Config,
    docx::{load_image, read_package, DocxBuilder},
    engine::ConversionEngine,
    error::{ConversionError, MergeError},
    report::ItemReport,
    resolver::{ConverterMode, EngineResolver},
    selector::Selection,
    source::{SourceItem, SourceKind},
    util::compact_timestamp,
};
use regex::Regex;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, info, warn};

/// Receives `(current, total, label)` after each completed item.
pub trait ProgressSink {
    fn on_progress(&self, current: usize, total: usize, label: &str);
}

impl<F: Fn(usize, usize, &str)> ProgressSink for F {
    fn on_progress(&self, current: usize, total: usize, label: &str) {
        self(current, total, label)
    }
}

/// Polled at item boundaries.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> CancelSignal for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub output_dir: PathBuf,
    /// Final file name; `.docx` is appended when missing. `None` or blank
    /// picks a timestamped name.
    pub output_name: Option<String>,
    pub mode: ConverterMode,
    pub force_probe: bool,
}

impl MergeRequest {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_name: None,
            mode: ConverterMode::Auto,
            force_probe: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub output: PathBuf,
    pub engine: Option<String>,
    pub items: Vec<ItemReport>,
    pub segments: usize,
    pub page_breaks: usize,
}

pub struct MergePipeline {
    cfg: Config,
    resolver: Arc<EngineResolver>,
}

impl MergePipeline {
    pub fn new(cfg: &Config, resolver: Arc<EngineResolver>) -> Self {
        Self {
            cfg: cfg.clone(),
            resolver,
        }
    }

    /// Merges the checked, present `items` in order into one package under
    /// `req.output_dir`. Nothing is left at the final path or its `.tmp`
    /// sibling unless the run succeeds.
    pub fn run(
        &self,
        items: &[SourceItem],
        req: &MergeRequest,
        progress: &dyn ProgressSink,
        cancel: &dyn CancelSignal,
    ) -> Result<MergeOutcome, MergeError> {
        let selected: Vec<&SourceItem> = items
            .iter()
            .filter(|item| {
                if item.is_missing() {
                    warn!("skipping missing file: {}", item.path.display());
                }
                item.is_mergeable()
            })
            .collect();
        if selected.is_empty() {
            return Err(MergeError::NothingToMerge);
        }

        let file_name = output_file_name(
            req.output_name.as_deref(),
            &self.cfg.output.default_name_prefix,
        )?;
        let final_path = req.output_dir.join(&file_name);
        let tmp_path = req.output_dir.join(format!("{file_name}.tmp"));

        let selection = if selected.iter().any(|i| i.kind.needs_engine()) {
            let selection = self
                .resolver
                .require_selection(req.mode, req.force_probe)
                .inspect_err(log_conversion_failure)?;
            info!(
                engine = selection.engine.name(),
                mode = %req.mode,
                "conversion engine selected"
            );
            Some(selection)
        } else {
            None
        };

        if let (Some(sel), Some(pdf)) = (
            &selection,
            selected.iter().find(|i| i.kind == SourceKind::Pdf),
        ) {
            if !sel.engine.supports_pdf() {
                let err = ConversionError::UnsupportedOperation {
                    engine: sel.engine.name().to_string(),
                    operation: "PDF conversion",
                    input: pdf.path.clone(),
                };
                log_conversion_failure(&err);
                return Err(err.into());
            }
        }

        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        std::fs::create_dir_all(&req.output_dir).map_err(|e| {
            MergeError::assembly(format!("create output dir {}", req.output_dir.display()), e)
        })?;
        let work_root = self.cfg.paths.work_dir();
        std::fs::create_dir_all(&work_root).map_err(|e| {
            MergeError::assembly(format!("create work dir {}", work_root.display()), e)
        })?;
        let work = tempfile::Builder::new()
            .prefix("docmerge-")
            .tempdir_in(&work_root)
            .map_err(|e| MergeError::assembly("create private temp dir", e))?;
        debug!("work dir {}", work.path().display());

        let run = Run {
            cfg: &self.cfg,
            items: &selected,
            engine: selection.as_ref(),
            work: work.path(),
            progress,
            cancel,
        };
        let outcome = run.execute(&final_path, &tmp_path);

        let work_path = work.path().to_path_buf();
        if let Err(err) = work.close() {
            warn!("removing temp dir {}: {err}", work_path.display());
        }

        match &outcome {
            Ok(out) => info!("merge complete: {}", out.output.display()),
            Err(MergeError::Cancelled) => warn!("merge cancelled"),
            Err(MergeError::Conversion(err)) => log_conversion_failure(err),
            Err(err) => error!("merge failed: {err}"),
        }
        outcome
    }
}

struct Run<'a> {
    cfg: &'a Config,
    items: &'a [&'a SourceItem],
    engine: Option<&'a Selection>,
    work: &'a Path,
    progress: &'a dyn ProgressSink,
    cancel: &'a dyn CancelSignal,
}

impl Run<'_> {
    fn engine(&self) -> Result<&dyn ConversionEngine, MergeError> {
        self.engine
            .map(|s| s.engine.as_ref())
            .ok_or_else(|| {
                MergeError::Conversion(ConversionError::CapabilityUnavailable {
                    engine: "none".into(),
                    reason: "no conversion engine was resolved".into(),
                    diagnostics: Default::default(),
                })
            })
    }

    fn check_cancel(&self) -> Result<(), MergeError> {
        if self.cancel.is_cancelled() {
            Err(MergeError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn execute(&self, final_path: &Path, tmp_path: &Path) -> Result<MergeOutcome, MergeError> {
        let pending = PendingOutput::new(tmp_path)?;
        let converted = self.convert_legacy()?;

        let total = self.items.len();
        let engine_name = self.engine.map(|s| s.engine.name().to_string());
        let mut doc = DocxBuilder::new(self.cfg.page);
        let mut reports = Vec::with_capacity(total);

        for (i, item) in self.items.iter().enumerate() {
            self.check_cancel()?;

            let via = match item.kind {
                SourceKind::XmlDoc => {
                    doc.append_sub_document(read_package(&item.path)?);
                    "embedded".to_string()
                }
                SourceKind::LegacyDoc => {
                    let path = converted.get(&i).ok_or_else(|| {
                        MergeError::Conversion(ConversionError::CountMismatch {
                            engine: engine_name.clone().unwrap_or_default(),
                            expected: i + 1,
                            actual: converted.len(),
                        })
                    })?;
                    doc.append_sub_document(read_package(path)?);
                    engine_name.clone().unwrap_or_default()
                }
                SourceKind::Pdf => {
                    let engine = self.engine()?;
                    let out = engine.convert_pdf(&item.path, &self.work.join("pdf"))?;
                    doc.append_sub_document(read_package(&out)?);
                    if let Err(err) = std::fs::remove_file(&out) {
                        debug!("removing converted pdf {}: {err}", out.display());
                    }
                    engine.name().to_string()
                }
                SourceKind::Image => {
                    let img = load_image(&item.path, &self.cfg.page)?;
                    debug!(
                        "image {} {}x{}px -> {}x{} emu",
                        item.name, img.width_px, img.height_px, img.cx_emu, img.cy_emu
                    );
                    doc.append_image(&img, &item.name);
                    "image".to_string()
                }
            };
            if i + 1 < total {
                doc.append_page_break();
            }

            self.progress.on_progress(i + 1, total, &item.name);
            reports.push(ItemReport {
                index: i + 1,
                label: item.name.clone(),
                kind: item.kind,
                via,
            });
        }
        self.check_cancel()?;

        pending.write(&doc)?;
        pending.commit(final_path)?;

        Ok(MergeOutcome {
            output: final_path.to_path_buf(),
            engine: engine_name,
            items: reports,
            segments: doc.segments(),
            page_breaks: doc.page_breaks(),
        })
    }

    /// One batch call for every legacy item, keyed by item position.
    fn convert_legacy(&self) -> Result<HashMap<usize, PathBuf>, MergeError> {
        let positions: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.kind == SourceKind::LegacyDoc)
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Ok(HashMap::new());
        }
        self.check_cancel()?;

        let engine = self.engine()?;
        let inputs: Vec<PathBuf> = positions
            .iter()
            .map(|&i| self.items[i].path.clone())
            .collect();
        let batch = engine.convert_batch(&inputs, &self.work.join("legacy"))?;
        if batch.outputs.len() != inputs.len() {
            return Err(ConversionError::CountMismatch {
                engine: engine.name().to_string(),
                expected: inputs.len(),
                actual: batch.outputs.len(),
            }
            .into());
        }
        info!(count = batch.len(), "legacy documents converted");
        Ok(positions.into_iter().zip(batch.outputs).collect())
    }
}

/// The `.tmp` sibling of the final output. Removed on drop unless committed.
struct PendingOutput {
    tmp: PathBuf,
    committed: bool,
}

impl PendingOutput {
    fn new(tmp: &Path) -> Result<Self, MergeError> {
        if tmp.exists() {
            std::fs::remove_file(tmp).map_err(|e| {
                MergeError::assembly(format!("remove stale {}", tmp.display()), e)
            })?;
        }
        Ok(Self {
            tmp: tmp.to_path_buf(),
            committed: false,
        })
    }

    fn write(&self, doc: &DocxBuilder) -> Result<(), MergeError> {
        let ctx = || format!("write {}", self.tmp.display());
        let file = std::fs::File::create(&self.tmp).map_err(|e| MergeError::assembly(ctx(), e))?;
        let mut writer = doc
            .write_to(BufWriter::new(file))
            .map_err(|e| MergeError::assembly(ctx(), e))?;
        writer.flush().map_err(|e| MergeError::assembly(ctx(), e))?;
        let file = writer
            .into_inner()
            .map_err(|e| MergeError::assembly(ctx(), e.into_error()))?;
        file.sync_all().map_err(|e| MergeError::assembly(ctx(), e))
    }

    fn commit(mut self, final_path: &Path) -> Result<(), MergeError> {
        std::fs::rename(&self.tmp, final_path).map_err(|e| {
            MergeError::assembly(
                format!("rename {} -> {}", self.tmp.display(), final_path.display()),
                e,
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingOutput {
    fn drop(&mut self) {
        if self.committed || !self.tmp.exists() {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.tmp) {
            warn!("removing {}: {err}", self.tmp.display());
        }
    }
}

static RE_RESERVED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("valid reserved-name regex"));

/// Normalizes the requested output name: trimmed, no path or reserved
/// characters, `.docx` suffix.
pub fn output_file_name(requested: Option<&str>, prefix: &str) -> Result<String, MergeError> {
    let name = requested.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Ok(format!("{prefix}_{}.docx", compact_timestamp()));
    }
    if RE_RESERVED_NAME.is_match(name) {
        return Err(MergeError::InvalidOutputName {
            name: name.to_string(),
            reason: r#"contains one of \ / : * ? " < > |"#.into(),
        });
    }
    if name.to_ascii_lowercase().ends_with(".docx") {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}.docx"))
    }
}

fn log_conversion_failure(err: &ConversionError) {
    match err.diagnostics() {
        Some(diag) => error!(
            input = ?err.failed_input(),
            exit_code = diag.exit_code,
            stdout = %diag.stdout.trim(),
            stderr = %diag.stderr.trim(),
            "{err}"
        ),
        None => error!(input = ?err.failed_input(), "{err}"),
    }
}

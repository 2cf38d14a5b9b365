//! PowerShell script generation for office automation sessions.
//!
//! Scripts are assembled from typed values: paths and product ids go through
//! [`PsLiteral`], format codes are integers. Nothing else interpolates text.

use crate::engine::EngineDescriptor;
use std::fmt;
use std::path::{Path, PathBuf};

/// Marker prefix the engine looks for in captured script output.
pub const MARKER: &str = "[[docmerge]]";

/// One input/output pair handled by a generated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// A single-quoted PowerShell string literal.
///
/// PowerShell also treats the typographic single quotes as quote characters,
/// so those are doubled along with `'`.
pub struct PsLiteral<'a>(pub &'a str);

impl fmt::Display for PsLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("'")?;
        for ch in self.0.chars() {
            match ch {
                '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => {
                    write!(f, "{ch}{ch}")?;
                }
                _ => write!(f, "{ch}")?,
            }
        }
        f.write_str("'")
    }
}

fn path_literal(p: &Path) -> String {
    PsLiteral(&p.to_string_lossy()).to_string()
}

/// Indentation-aware line accumulator.
#[derive(Default)]
pub struct ScriptBuilder {
    buf: String,
    depth: usize,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, s: impl AsRef<str>) -> &mut Self {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
        self.buf.push_str(s.as_ref());
        self.buf.push('\n');
        self
    }

    /// Emits `s` and indents following lines.
    pub fn open(&mut self, s: impl AsRef<str>) -> &mut Self {
        self.line(s);
        self.depth += 1;
        self
    }

    /// Dedents, then emits `s`.
    pub fn close(&mut self, s: impl AsRef<str>) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line(s)
    }

    /// `} catch {` style transition at the enclosing depth.
    pub fn reopen(&mut self, s: impl AsRef<str>) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.open(s)
    }

    pub fn finish(self) -> String {
        self.buf
    }

    fn preamble(&mut self) -> &mut Self {
        self.line("$ErrorActionPreference = 'Stop'")
            .line("[Console]::OutputEncoding = [System.Text.Encoding]::UTF8")
            .line("$OutputEncoding = [System.Text.Encoding]::UTF8")
            // Write-Error under Stop would throw again inside the handler and
            // the real exit code is lost.
            .line("function _err([string]$m) { try { [Console]::Error.WriteLine($m) } catch { } }")
            .line("function _release($o) { if ($o -ne $null) { try { [System.Runtime.Interopservices.Marshal]::FinalReleaseComObject($o) | Out-Null } catch { } } }")
    }

    fn job_entry(&mut self, prefix: &str, job: &ConversionJob) -> &mut Self {
        self.line(format!(
            "{prefix}@{{ Input = {}; Output = {} }}",
            path_literal(&job.input),
            path_literal(&job.output)
        ))
    }

    fn create_app(&mut self, prog_id: &str, visible: bool) -> &mut Self {
        self.line(format!("$app = New-Object -ComObject {}", PsLiteral(prog_id)))
            .line(format!(
                "try {{ $app.Visible = {} }} catch {{ }}",
                if visible { "$true" } else { "$false" }
            ))
            .line("try { $app.DisplayAlerts = 0 } catch { }")
    }

    fn quiet_open_options(&mut self) -> &mut Self {
        self.line("try { $app.AutomationSecurity = 3 } catch { }")
            .line("try { $app.Options.ConfirmConversions = $false } catch { }")
    }

    fn error_handler(&mut self, label: &str, report_index: bool) -> &mut Self {
        if report_index {
            self.line(format!("_err ('{MARKER} failed-index ' + $current)"));
        }
        self.line(format!("_err ('[{label}] ' + $_.Exception.ToString())"))
            .line("try { _err ('[ErrorRecord] ' + ($_ | Format-List -Force * | Out-String)) } catch { }")
            .line("$exitCode = 1")
    }

    fn close_document(&mut self) -> &mut Self {
        self.open("if ($doc -ne $null) {")
            .line("try { $doc.Close($false) | Out-Null } catch { }")
            .line("_release $doc")
            .close("}")
            .open("if ($pv -ne $null) {")
            .line("try { $pv.Close() | Out-Null } catch { }")
            .line("_release $pv")
            .close("}")
    }

    fn quit_app(&mut self) -> &mut Self {
        self.open("if ($app -ne $null) {")
            .line("try { $app.Quit() | Out-Null } catch { }")
            .line("_release $app")
            .close("}")
            .line("try { [GC]::Collect() } catch { }")
            .line("try { [GC]::WaitForPendingFinalizers() } catch { }")
    }

    fn remove_stale(&mut self, out: &str) -> &mut Self {
        self.line(format!(
            "if (Test-Path -LiteralPath {out}) {{ Remove-Item -LiteralPath {out} -Force }}"
        ))
    }

    /// Direct open, then protected-view open-and-edit, then the one-argument open.
    fn open_chain_nested(&mut self, input: &str) -> &mut Self {
        self.open("try {")
            .line(format!("$doc = $app.Documents.Open({input}, $false, $true, $false)"))
            .reopen("} catch {")
            .open("try {")
            .line(format!("$pv = $app.ProtectedViewWindows.Open({input})"))
            .line("$doc = $pv.Edit()")
            .reopen("} catch {")
            .line(format!("$doc = $app.Documents.Open({input})"))
            .close("}")
            .close("}")
    }

    /// Same chain, but each step only runs when the previous one left `$doc`
    /// empty, with a final look at the active document.
    fn open_chain_sequential(&mut self, input: &str) -> &mut Self {
        self.line(format!(
            "try {{ $doc = $app.Documents.Open({input}, $false, $true, $false) }} catch {{ $doc = $null }}"
        ))
        .open("if ($doc -eq $null) {")
        .line(format!(
            "try {{ $pv = $app.ProtectedViewWindows.Open({input}); $doc = $pv.Edit() }} catch {{ $doc = $null }}"
        ))
        .close("}")
        .line(format!("if ($doc -eq $null) {{ $doc = $app.Documents.Open({input}) }}"))
        .line("if ($doc -eq $null) { try { $doc = $app.ActiveDocument } catch { } }")
    }

    fn save_chain(&mut self, d: &EngineDescriptor, out: &str, retries: u32) -> &mut Self {
        self.line("$saved = $false")
            .line(format!(
                "$fmts = @({}, {})",
                d.formats.primary, d.formats.fallback
            ))
            .open("foreach ($fmt in $fmts) {")
            .line("if ($saved) { break }");
        if retries > 0 {
            self.open(format!("for ($i = 1; $i -le {retries}; $i++) {{"))
                .open("try {")
                .line(format!("$doc.SaveAs2({out}, [int]$fmt)"))
                .line("$saved = $true")
                .line("break")
                .reopen("} catch {")
                .line("Start-Sleep -Seconds (2 * $i)")
                .close("}")
                .close("}");
        } else {
            self.line(format!(
                "try {{ $doc.SaveAs2({out}, [int]$fmt); $saved = $true }} catch {{ }}"
            ));
        }
        self.line(format!(
            "if (-not $saved) {{ try {{ $doc.SaveAs({out}, [int]$fmt); $saved = $true }} catch {{ }} }}"
        ))
        .close("}")
        .line(format!(
            "if (-not $saved) {{ try {{ $doc.SaveAs({out}); $saved = $true }} catch {{ }} }}"
        ))
        .line(format!("if (-not $saved) {{ throw ('save failed: ' + {out}) }}"))
    }
}

/// Pluggable script generation for one automation product.
pub trait ScriptStrategy: Send + Sync {
    fn probe(&self, d: &EngineDescriptor) -> String;
    fn batch(&self, d: &EngineDescriptor, jobs: &[ConversionJob]) -> String;
    fn pdf(&self, d: &EngineDescriptor, job: &ConversionJob) -> String;
}

/// COM automation through `New-Object -ComObject`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComAutomationScripts;

/// Attempts per format code when saving a reflowed PDF.
pub const PDF_SAVE_ATTEMPTS: u32 = 3;

impl ScriptStrategy for ComAutomationScripts {
    fn probe(&self, d: &EngineDescriptor) -> String {
        let mut b = ScriptBuilder::new();
        b.preamble()
            .line("$exitCode = 0")
            .line("$app = $null")
            .open("try {")
            .create_app(&d.prog_id, false)
            .reopen("} catch {")
            .error_handler("probe error", false)
            .reopen("} finally {")
            .quit_app()
            .close("}")
            .line("exit $exitCode");
        b.finish()
    }

    fn batch(&self, d: &EngineDescriptor, jobs: &[ConversionJob]) -> String {
        let mut b = ScriptBuilder::new();
        b.preamble().open("$jobs = @(");
        for job in jobs {
            b.job_entry("", job);
        }
        b.close(")")
            .line("$exitCode = 0")
            .line("$current = 0")
            .line("$app = $null")
            .open("try {")
            .create_app(&d.prog_id, false)
            .quiet_open_options()
            .open("foreach ($job in $jobs) {")
            .line("$current++")
            .line("$doc = $null")
            .line("$pv = $null")
            .open("try {")
            .remove_stale("$job.Output")
            .open_chain_nested("$job.Input")
            .line("if ($doc -eq $null) { throw ('cannot open document: ' + $job.Input) }")
            .save_chain(d, "$job.Output", 0)
            .line(format!("[Console]::Out.WriteLine('{MARKER} converted ' + $current)"))
            .reopen("} finally {")
            .close_document()
            .close("}")
            .close("}")
            .reopen("} catch {")
            .error_handler("conversion error", true)
            .reopen("} finally {")
            .quit_app()
            .close("}")
            .line("exit $exitCode");
        b.finish()
    }

    fn pdf(&self, d: &EngineDescriptor, job: &ConversionJob) -> String {
        let mut b = ScriptBuilder::new();
        b.preamble()
            .job_entry("$job = ", job)
            .line("$exitCode = 0")
            .line("$app = $null")
            .line("$doc = $null")
            .line("$pv = $null")
            .open("try {")
            .remove_stale("$job.Output")
            // Some hosts only reflow PDFs reliably with a visible window.
            .create_app(&d.prog_id, true)
            .quiet_open_options()
            .open_chain_sequential("$job.Input")
            .line("if ($doc -eq $null) { throw ('cannot open PDF: ' + $job.Input) }")
            .line("try { $doc.Activate() | Out-Null } catch { }")
            .line("Start-Sleep -Milliseconds 800")
            .line("try { $doc.Repaginate() | Out-Null } catch { }")
            .save_chain(d, "$job.Output", PDF_SAVE_ATTEMPTS)
            .line(format!("[Console]::Out.WriteLine('{MARKER} converted 1')"))
            .reopen("} catch {")
            .error_handler("pdf conversion error", false)
            .reopen("} finally {")
            .close_document()
            .quit_app()
            .close("}")
            .line("exit $exitCode");
        b.finish()
    }
}

/// Extracts the 1-based `failed-index` a batch script reported, if any.
pub fn failed_index(stderr: &str) -> Option<usize> {
    let needle = format!("{MARKER} failed-index ");
    stderr.lines().find_map(|l| {
        let rest = l.trim().strip_prefix(&needle)?;
        rest.trim().parse::<usize>().ok().filter(|n| *n > 0)
    })
}

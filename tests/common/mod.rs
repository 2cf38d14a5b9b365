#![allow(dead_code)]

use docmerge::error::{ScriptError, ScriptOutput};
use docmerge::script::{ScriptRunner, MARKER};
use regex::Regex;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Smallest package `read_package` accepts, with `text` as its only paragraph.
pub fn docx_bytes(text: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", opts).unwrap();
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    zip.start_file("word/document.xml", opts).unwrap();
    write!(
        zip,
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body></w:document>"#
    )
    .unwrap();
    zip.finish().unwrap().into_inner()
}

pub fn write_docx(path: &Path, text: &str) {
    std::fs::write(path, docx_bytes(text)).unwrap();
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]))
        .save(path)
        .unwrap();
}

/// Stand-in for a legacy document; only the extension matters to the fakes.
pub fn write_doc(path: &Path) {
    std::fs::write(path, b"\xD0\xCF\x11\xE0legacy").unwrap();
}

pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => rd.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Pulls the `Input`/`Output` pairs back out of a generated script.
pub fn parse_jobs(script: &str) -> Vec<(PathBuf, PathBuf)> {
    let re = Regex::new(r"Input = '((?:[^']|'')*)'; Output = '((?:[^']|'')*)'").unwrap();
    re.captures_iter(script)
        .map(|c| (PathBuf::from(unquote(&c[1])), PathBuf::from(unquote(&c[2]))))
        .collect()
}

fn unquote(s: &str) -> String {
    ["'", "\u{2018}", "\u{2019}", "\u{201A}", "\u{201B}"]
        .iter()
        .fold(s.to_string(), |acc, q| acc.replace(&format!("{q}{q}"), q))
}

/// Scripted interpreter: creates the outputs a generated script names, or
/// fails the way a real automation script would.
pub struct FakeRunner {
    pub interpreter: Option<PathBuf>,
    /// 1-based job that throws; earlier outputs are still written.
    pub fail_at: Option<usize>,
    /// 1-based job whose output silently never appears.
    pub omit: Option<usize>,
    pub time_out: bool,
    pub probe_ok: bool,
    pub hold: Duration,
    pub probes: AtomicUsize,
    pub conversions: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub scripts: Mutex<Vec<String>>,
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self {
            interpreter: Some(PathBuf::from("fake-powershell")),
            fail_at: None,
            omit: None,
            time_out: false,
            probe_ok: true,
            hold: Duration::ZERO,
            probes: AtomicUsize::new(0),
            conversions: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            scripts: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRunner {
    fn execute(&self, script: &str, timeout: Duration) -> Result<ScriptOutput, ScriptError> {
        let jobs = parse_jobs(script);
        if jobs.is_empty() {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.probe_ok {
                return Ok(ScriptOutput::default());
            }
            return Err(ScriptError::NonZeroExit(ScriptOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "[probe error] class not registered".into(),
            }));
        }

        self.conversions.fetch_add(1, Ordering::SeqCst);
        if self.time_out {
            return Err(ScriptError::Timeout {
                timeout,
                output: ScriptOutput::default(),
            });
        }
        let mut stdout = String::new();
        for (i, (input, output)) in jobs.iter().enumerate() {
            let n = i + 1;
            if self.fail_at == Some(n) {
                return Err(ScriptError::NonZeroExit(ScriptOutput {
                    exit_code: 1,
                    stdout,
                    stderr: format!(
                        "{MARKER} failed-index {n}\n[conversion error] cannot open {}",
                        input.display()
                    ),
                }));
            }
            if self.omit == Some(n) {
                continue;
            }
            let label = input.file_name().unwrap().to_string_lossy();
            std::fs::write(output, docx_bytes(&format!("converted {label}"))).unwrap();
            stdout.push_str(&format!("{MARKER} converted {n}\n"));
        }
        Ok(ScriptOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }
}

impl ScriptRunner for FakeRunner {
    fn interpreter(&self) -> Option<&Path> {
        self.interpreter.as_deref()
    }

    fn host_supported(&self) -> bool {
        true
    }

    fn run_script(&self, script: &str, timeout: Duration) -> Result<ScriptOutput, ScriptError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.scripts.lock().unwrap().push(script.to_string());
        if !self.hold.is_zero() {
            std::thread::sleep(self.hold);
        }
        let result = self.execute(script, timeout);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

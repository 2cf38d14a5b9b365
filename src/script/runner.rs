use crate::config::Config;
use crate::error::{ScriptError, ScriptOutput};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Executes one generated automation script in an external interpreter.
pub trait ScriptRunner: Send + Sync {
    /// Interpreter resolved at construction; `None` disables automation for
    /// the lifetime of the runner.
    fn interpreter(&self) -> Option<&Path>;

    /// Whether the host OS can run automation sessions at all.
    fn host_supported(&self) -> bool {
        cfg!(windows)
    }

    fn run_script(&self, script: &str, timeout: Duration) -> Result<ScriptOutput, ScriptError>;
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub struct PowerShellRunner {
    interpreter: Option<PathBuf>,
    keep_stderr: bool,
}

impl PowerShellRunner {
    /// Resolves the interpreter once from the configured candidates.
    pub fn new(cfg: &Config) -> Self {
        let interpreter = resolve_interpreter(
            &cfg.script.candidates,
            Duration::from_secs(cfg.script.liveness_timeout_seconds),
        );
        match &interpreter {
            Some(p) => info!("script interpreter: {}", p.display()),
            None => warn!(
                "no script interpreter responded (tried {:?}); automation disabled",
                cfg.script.candidates
            ),
        }
        Self {
            interpreter,
            keep_stderr: cfg.debug.keep_script_stderr,
        }
    }

    pub fn with_interpreter(interpreter: Option<PathBuf>) -> Self {
        Self {
            interpreter,
            keep_stderr: false,
        }
    }
}

impl ScriptRunner for PowerShellRunner {
    fn interpreter(&self) -> Option<&Path> {
        self.interpreter.as_deref()
    }

    fn run_script(&self, script: &str, timeout: Duration) -> Result<ScriptOutput, ScriptError> {
        let exe = self
            .interpreter
            .as_deref()
            .ok_or(ScriptError::InterpreterNotFound)?;

        let script_path = write_script_file(script).map_err(|source| ScriptError::Spawn { source })?;
        debug!(
            "script run {} timeout={:?}",
            script_path.display(),
            timeout
        );

        let child = Command::new(exe)
            .args([
                "-NoLogo",
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-STA",
                "-File",
            ])
            .arg(&*script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let result = match child {
            Ok(mut child) => match wait_with_timeout(&mut child, timeout) {
                Ok(Waited::Exited(status, output)) => {
                    let output = ScriptOutput {
                        exit_code: status.code().unwrap_or(-1),
                        ..output
                    };
                    if status.success() {
                        if self.keep_stderr && !output.stderr.trim().is_empty() {
                            debug!("script stderr: {}", output.stderr.trim());
                        }
                        Ok(output)
                    } else {
                        Err(ScriptError::NonZeroExit(output))
                    }
                }
                Ok(Waited::TimedOut(output)) => {
                    warn!("script process timed out after {:?}", timeout);
                    Err(ScriptError::Timeout { timeout, output })
                }
                Err(err) => Err(err),
            },
            Err(source) => Err(ScriptError::Spawn { source }),
        };

        if let Err(err) = script_path.close() {
            debug!("removing script file: {err}");
        }
        result
    }
}

/// Writes the script with a UTF-8 byte-order marker; Windows PowerShell
/// decodes BOM-less files with the ANSI code page.
fn write_script_file(script: &str) -> std::io::Result<tempfile::TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("docmerge-com-")
        .suffix(".ps1")
        .tempfile()?;
    file.write_all(UTF8_BOM)?;
    file.write_all(script.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// Probes each candidate with a short version query; the first that answers
/// with exit 0 wins.
pub fn resolve_interpreter(candidates: &[String], liveness: Duration) -> Option<PathBuf> {
    for candidate in candidates {
        let spawned = Command::new(candidate)
            .args([
                "-NoLogo",
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "$PSVersionTable.PSVersion",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(c) => c,
            Err(err) => {
                debug!("interpreter candidate {candidate} not runnable: {err}");
                continue;
            }
        };
        match wait_with_timeout(&mut child, liveness) {
            Ok(Waited::Exited(status, _)) if status.success() => {
                return Some(PathBuf::from(candidate));
            }
            Ok(Waited::Exited(status, _)) => {
                debug!("interpreter candidate {candidate} exited with {status}");
            }
            Ok(Waited::TimedOut(_)) => {
                debug!("interpreter candidate {candidate} did not answer within {liveness:?}");
            }
            Err(err) => debug!("interpreter candidate {candidate}: {err}"),
        }
    }
    None
}

enum Waited {
    Exited(ExitStatus, ScriptOutput),
    TimedOut(ScriptOutput),
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Waited, ScriptError> {
    // Drain pipes while waiting so chatty automation output can't deadlock the
    // child on a full stdout/stderr buffer.
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(Waited::Exited(status, collect(&stdout, &stderr)));
            }
            Ok(None) => {}
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ScriptError::Interrupted(format!("try_wait: {err}")));
            }
        }

        if start.elapsed() > timeout {
            let _ = child.kill();
            if let Err(err) = child.wait() {
                return Err(ScriptError::Interrupted(format!("wait after kill: {err}")));
            }
            return Ok(Waited::TimedOut(collect(&stdout, &stderr)));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}

/// How long pipe output is still collected once the interpreter is gone.
/// Descendants that inherited the pipes may hold them open indefinitely.
const PIPE_GRACE: Duration = Duration::from_millis(750);

fn spawn_reader<R: Read + Send + 'static>(reader: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut r) = reader {
        std::thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match r.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => {}
                    Err(err) => {
                        debug!("reading script pipe: {err}");
                        break;
                    }
                }
            }
        });
    }
    rx
}

fn collect(stdout: &Receiver<Vec<u8>>, stderr: &Receiver<Vec<u8>>) -> ScriptOutput {
    let deadline = Instant::now() + PIPE_GRACE;
    ScriptOutput {
        exit_code: -1,
        stdout: String::from_utf8_lossy(&drain_until(stdout, deadline)).into_owned(),
        stderr: String::from_utf8_lossy(&drain_until(stderr, deadline)).into_owned(),
    }
}

/// Everything received before the pipe closes or `deadline` passes.
fn drain_until(rx: &Receiver<Vec<u8>>, deadline: Instant) -> Vec<u8> {
    let mut buf = Vec::new();
    loop {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                while let Ok(chunk) = rx.try_recv() {
                    buf.extend_from_slice(&chunk);
                }
                debug!("script pipe still open after {PIPE_GRACE:?}; keeping partial output");
                break;
            }
        }
    }
    buf
}

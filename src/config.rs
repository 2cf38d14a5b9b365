use crate::engine::{EngineDescriptor, EngineKind, FormatPriority};
use crate::resolver::ConverterMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub script: Script,
    #[serde(default)]
    pub engines: Engines,
    #[serde(default)]
    pub page: Page,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Parent directory for private per-run temp dirs. Empty means the OS temp dir.
    pub work_dir: String,
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: "".into(),
            out_dir: "out".into(),
        }
    }
}

impl Paths {
    pub fn work_dir(&self) -> PathBuf {
        if self.work_dir.trim().is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.work_dir)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    pub candidates: Vec<String>,
    pub liveness_timeout_seconds: u64,
}
impl Default for Script {
    fn default() -> Self {
        Self {
            candidates: vec!["powershell".into(), "pwsh".into()],
            liveness_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engines {
    pub mode: ConverterMode,
    pub probe_ttl_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub batch_timeout_seconds: u64,
    pub pdf_timeout_seconds: u64,
    pub primary: EngineEntry,
    pub secondary: EngineEntry,
}
impl Default for Engines {
    fn default() -> Self {
        Self {
            mode: ConverterMode::Auto,
            probe_ttl_seconds: 60,
            probe_timeout_seconds: 10,
            batch_timeout_seconds: 600,
            pdf_timeout_seconds: 900,
            primary: EngineEntry {
                name: "Microsoft Word".into(),
                prog_id: "Word.Application".into(),
                formats: [16, 12],
                supports_pdf: true,
            },
            secondary: EngineEntry {
                name: "WPS Writer".into(),
                prog_id: "kwps.application".into(),
                formats: [12, 16],
                supports_pdf: false,
            },
        }
    }
}

impl Engines {
    pub fn timeouts(&self) -> EngineTimeouts {
        EngineTimeouts {
            probe: Duration::from_secs(self.probe_timeout_seconds),
            batch: Duration::from_secs(self.batch_timeout_seconds),
            pdf: Duration::from_secs(self.pdf_timeout_seconds),
        }
    }

    pub fn probe_ttl(&self) -> Duration {
        Duration::from_secs(self.probe_ttl_seconds)
    }
}

/// One automation product. Format codes are opaque product constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEntry {
    pub name: String,
    pub prog_id: String,
    pub formats: [i32; 2],
    #[serde(default)]
    pub supports_pdf: bool,
}

impl EngineEntry {
    pub fn descriptor(&self, kind: EngineKind) -> EngineDescriptor {
        EngineDescriptor {
            kind,
            name: self.name.clone(),
            prog_id: self.prog_id.clone(),
            formats: FormatPriority {
                primary: self.formats[0],
                fallback: self.formats[1],
            },
            supports_pdf: self.supports_pdf,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineTimeouts {
    pub probe: Duration,
    pub batch: Duration,
    pub pdf: Duration,
}
impl Default for EngineTimeouts {
    fn default() -> Self {
        Engines::default().timeouts()
    }
}

/// Page geometry in twips (1/1440 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    pub width_twips: u32,
    pub height_twips: u32,
    pub margin_left_twips: u32,
    pub margin_right_twips: u32,
    pub margin_top_twips: u32,
    pub margin_bottom_twips: u32,
}
impl Default for Page {
    fn default() -> Self {
        Self {
            width_twips: 11906,
            height_twips: 16838,
            margin_left_twips: 1440,
            margin_right_twips: 1440,
            margin_top_twips: 1440,
            margin_bottom_twips: 1440,
        }
    }
}

impl Page {
    pub fn printable_width_twips(&self) -> u32 {
        self.width_twips
            .saturating_sub(self.margin_left_twips)
            .saturating_sub(self.margin_right_twips)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub default_name_prefix: String,
    pub write_report: bool,
    pub print_summary: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            default_name_prefix: "merged".into(),
            write_report: false,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub keep_script_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_script_stderr: true,
            dump_effective_config: false,
        }
    }
}

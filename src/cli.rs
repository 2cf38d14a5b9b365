use crate::{
    config::Config,
    engine::SessionCoordinator,
    pipeline::{MergePipeline, MergeRequest, NeverCancel},
    report::MergeReport,
    resolver::{ConverterMode, EngineResolver},
    script::PowerShellRunner,
    selector::EngineSelector,
    source::SourceItem,
    util::{ensure_dir, now_rfc3339, sha256_file},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "docmerge")]
#[command(about = "Merge legacy documents, packages, PDFs and images into one document")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./docmerge.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe both automation engines and show which one a mode resolves to.
    Probe {
        #[arg(long)]
        refresh: bool,
        /// auto, primary_only or secondary_only. Defaults to [engines].mode.
        #[arg(long)]
        mode: Option<String>,
    },
    /// Merge the inputs, in the order given, into one document.
    Merge {
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Output file name; `.docx` is appended when missing.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mode: Option<String>,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref())? {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;

    match &args.cmd {
        Command::Probe { refresh, mode } => probe(&cfg, *refresh, mode.as_deref()),
        Command::Merge {
            out_dir,
            name,
            mode,
            inputs,
        } => merge(&cfg, out_dir.as_deref(), name.as_deref(), mode.as_deref(), inputs),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = user {
        if !p.exists() {
            return Err(anyhow!("config file not found: {}", p.display()));
        }
        return Ok(Some(p.to_path_buf()));
    }
    let default = PathBuf::from("docmerge.toml");
    Ok(default.exists().then_some(default))
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
    };

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.out_dir).join("docmerge.log"))
}

/// Writes the merged configuration as `effective-config.toml` under `dir`.
pub fn write_effective_config(cfg: &Config, dir: &Path) -> Result<PathBuf> {
    let raw = toml::to_string(cfg).context("serializing effective config")?;
    let path = dir.join("effective-config.toml");
    std::fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn build_resolver(cfg: &Config) -> EngineResolver {
    let runner = Arc::new(PowerShellRunner::new(cfg));
    let sessions = Arc::new(SessionCoordinator::new());
    let selector = EngineSelector::from_config(cfg, runner, sessions);
    EngineResolver::new(Arc::new(selector))
}

fn mode_or_default(cfg: &Config, raw: Option<&str>) -> ConverterMode {
    raw.map(ConverterMode::parse_lenient)
        .unwrap_or(cfg.engines.mode)
}

fn probe(cfg: &Config, refresh: bool, mode: Option<&str>) -> Result<()> {
    let mode = mode_or_default(cfg, mode);
    let resolver = build_resolver(cfg);
    let resolution = resolver.resolve(mode, refresh);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": &*resolution.summary,
            "mode": mode,
            "selected": resolution.selection.as_ref().map(|s| s.kind()),
            "message": resolution.message(),
        }))?
    );
    Ok(())
}

fn merge(
    cfg: &Config,
    out_dir: Option<&Path>,
    name: Option<&str>,
    mode: Option<&str>,
    inputs: &[PathBuf],
) -> Result<()> {
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        match SourceItem::from_path(input) {
            Some(item) => items.push(item),
            None => warn!("unsupported input type, skipping: {}", input.display()),
        }
    }

    let out_dir = out_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    ensure_dir(&out_dir)?;

    if cfg.debug.dump_effective_config {
        let path = write_effective_config(cfg, &out_dir)?;
        info!("effective config: {}", path.display());
    }

    let mut req = MergeRequest::new(&out_dir).with_mode(mode_or_default(cfg, mode));
    req.output_name = name.map(str::to_string);

    let pipeline = MergePipeline::new(cfg, Arc::new(build_resolver(cfg)));
    let progress = |current: usize, total: usize, label: &str| {
        info!("[{current}/{total}] {label}");
    };

    let started = now_rfc3339();
    let outcome = pipeline
        .run(&items, &req, &progress, &NeverCancel)
        .context("merge failed")?;
    let sha256 = sha256_file(&outcome.output)?;

    if cfg.output.write_report {
        let report = MergeReport {
            output: outcome.output.clone(),
            sha256: sha256.clone(),
            engine: outcome.engine.clone(),
            started,
            finished: now_rfc3339(),
            items: outcome.items.clone(),
        };
        let mut report_path = outcome.output.clone().into_os_string();
        report_path.push(".report.json");
        std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report {}", PathBuf::from(&report_path).display()))?;
    }

    if cfg.output.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "output": outcome.output,
                "sha256": sha256,
                "items": outcome.items.len(),
                "engine": outcome.engine,
            }))?
        );
    }

    Ok(())
}

use docmerge::config::{Config, Page};
use docmerge::resolver::ConverterMode;
use std::time::Duration;

#[test]
fn parse_example_config() {
    let raw = include_str!("../docmerge.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.engines.mode, ConverterMode::Auto);
    assert_eq!(cfg.engines.primary.prog_id, "Word.Application");
    assert_eq!(cfg.engines.primary.formats, [16, 12]);
    assert!(cfg.engines.primary.supports_pdf);
    assert!(!cfg.engines.secondary.supports_pdf);
    assert_eq!(cfg.page, Page::default());
    assert_eq!(cfg.script.candidates, vec!["powershell", "pwsh"]);
    assert!(!cfg.paths.out_dir.is_empty());
}

#[test]
fn partial_config_keeps_defaults() {
    let cfg: Config = toml::from_str(
        r#"
        [engines]
        mode = "WPS-only"
        batch_timeout_seconds = 30
        "#,
    )
    .expect("parse TOML");

    assert_eq!(cfg.engines.mode, ConverterMode::SecondaryOnly);
    let t = cfg.engines.timeouts();
    assert_eq!(t.batch, Duration::from_secs(30));
    assert_eq!(t.pdf, Duration::from_secs(900));
    assert_eq!(t.probe, Duration::from_secs(10));
    assert_eq!(cfg.engines.probe_ttl(), Duration::from_secs(60));
    assert_eq!(cfg.engines.secondary.prog_id, "kwps.application");
    assert_eq!(cfg.output.default_name_prefix, "merged");
}

#[test]
fn unknown_mode_falls_back_to_auto() {
    let cfg: Config = toml::from_str("[engines]\nmode = \"whatever\"\n").expect("parse TOML");
    assert_eq!(cfg.engines.mode, ConverterMode::Auto);
}

#[test]
fn empty_work_dir_means_os_temp() {
    let cfg = Config::default();
    assert_eq!(cfg.paths.work_dir(), std::env::temp_dir());
}

#[test]
fn effective_config_round_trips() {
    let cfg = Config::default();
    let raw = toml::to_string(&cfg).expect("serialize");
    let back: Config = toml::from_str(&raw).expect("parse");
    assert_eq!(back.engines.mode, cfg.engines.mode);
    assert_eq!(back.page, cfg.page);
}

#[test]
fn effective_config_is_written_as_parseable_toml() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.engines.mode = ConverterMode::PrimaryOnly;
    cfg.output.default_name_prefix = "bundle".into();

    let path = docmerge::cli::write_effective_config(&cfg, tmp.path()).unwrap();

    assert_eq!(path, tmp.path().join("effective-config.toml"));
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.trim().is_empty());
    let back: Config = toml::from_str(&raw).expect("parse written config");
    assert_eq!(back.engines.mode, ConverterMode::PrimaryOnly);
    assert_eq!(back.output.default_name_prefix, "bundle");
}

#[test]
fn effective_config_into_missing_dir_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = docmerge::cli::write_effective_config(&Config::default(), &tmp.path().join("absent"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("effective-config.toml"));
}

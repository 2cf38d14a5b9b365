mod common;

use common::FakeRunner;
use docmerge::config::{Config, EngineTimeouts};
use docmerge::engine::{ComEngine, ConversionEngine, EngineKind, SessionCoordinator};
use docmerge::error::ConversionError;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn engine(kind: EngineKind, runner: &Arc<FakeRunner>) -> ComEngine {
    let cfg = Config::default();
    let entry = match kind {
        EngineKind::Primary => &cfg.engines.primary,
        EngineKind::Secondary => &cfg.engines.secondary,
    };
    ComEngine::new(
        entry.descriptor(kind),
        Arc::clone(runner) as _,
        Arc::new(SessionCoordinator::new()),
        EngineTimeouts::default(),
        Duration::from_secs(60),
    )
}

fn inputs(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|n| {
            let p = dir.join(n);
            common::write_doc(&p);
            p
        })
        .collect()
}

#[test]
fn batch_returns_one_output_per_input_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let engine = engine(EngineKind::Primary, &runner);
    let ins = inputs(tmp.path(), &["alpha.doc", "beta.doc", "gamma.doc"]);
    let out_dir = tmp.path().join("converted");

    let batch = engine.convert_batch(&ins, &out_dir).unwrap();

    assert_eq!(batch.len(), 3);
    assert_eq!(batch.inputs, ins);
    for (i, (out, stem)) in batch.outputs.iter().zip(["alpha", "beta", "gamma"]).enumerate() {
        let name = out.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("{:03}_{stem}_", i + 1)), "{name}");
        assert!(name.ends_with(".docx"));
        assert!(out.is_file());
        assert_eq!(out.parent(), Some(out_dir.as_path()));
    }
    // one session for the whole batch
    assert_eq!(runner.conversions.load(Ordering::SeqCst), 1);
}

#[test]
fn failure_names_the_failing_input_and_discards_partial_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner {
        fail_at: Some(2),
        ..Default::default()
    });
    let engine = engine(EngineKind::Primary, &runner);
    let ins = inputs(tmp.path(), &["one.doc", "two.doc", "three.doc"]);
    let out_dir = tmp.path().join("converted");

    let err = engine.convert_batch(&ins, &out_dir).unwrap_err();

    match &err {
        ConversionError::ExecutionFailed {
            input, diagnostics, ..
        } => {
            assert_eq!(input, &ins[1]);
            assert_eq!(diagnostics.exit_code, 1);
            assert!(diagnostics.stderr.contains("cannot open"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.failed_input(), Some(ins[1].as_path()));
    assert!(common::dir_entries(&out_dir).is_empty());
}

#[test]
fn silent_shortfall_is_output_missing_for_that_input() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner {
        omit: Some(3),
        ..Default::default()
    });
    let engine = engine(EngineKind::Primary, &runner);
    let ins = inputs(tmp.path(), &["a.doc", "b.doc", "c.doc"]);
    let out_dir = tmp.path().join("converted");

    let err = engine.convert_batch(&ins, &out_dir).unwrap_err();
    assert!(
        matches!(&err, ConversionError::OutputMissing { input, .. } if input == &ins[2]),
        "{err:?}"
    );
    assert!(common::dir_entries(&out_dir).is_empty());
}

#[test]
fn timeout_is_reported_as_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner {
        time_out: true,
        ..Default::default()
    });
    let engine = engine(EngineKind::Primary, &runner);
    let ins = inputs(tmp.path(), &["slow.doc"]);

    let err = engine
        .convert_batch(&ins, &tmp.path().join("converted"))
        .unwrap_err();
    assert!(matches!(err, ConversionError::Timeout { .. }), "{err:?}");
    assert_eq!(err.diagnostics().map(|d| d.exit_code), Some(-1));
}

#[test]
fn empty_batch_does_not_start_a_session() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let engine = engine(EngineKind::Primary, &runner);

    let batch = engine.convert_batch(&[], tmp.path()).unwrap();
    assert!(batch.is_empty());
    assert_eq!(runner.probes.load(Ordering::SeqCst), 0);
    assert_eq!(runner.conversions.load(Ordering::SeqCst), 0);
}

#[test]
fn pdf_on_engine_without_pdf_support_is_rejected_without_a_session() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let engine = engine(EngineKind::Secondary, &runner);
    let pdf = tmp.path().join("scan.pdf");
    std::fs::write(&pdf, b"%PDF-1.4").unwrap();

    let err = engine.convert_pdf(&pdf, tmp.path()).unwrap_err();
    assert!(
        matches!(err, ConversionError::UnsupportedOperation { .. }),
        "{err:?}"
    );
    assert_eq!(runner.probes.load(Ordering::SeqCst), 0);
    assert_eq!(runner.conversions.load(Ordering::SeqCst), 0);
}

#[test]
fn pdf_conversion_yields_one_package() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let engine = engine(EngineKind::Primary, &runner);
    let pdf = tmp.path().join("scan.pdf");
    std::fs::write(&pdf, b"%PDF-1.4").unwrap();

    let out = engine.convert_pdf(&pdf, &tmp.path().join("pdf")).unwrap();
    assert!(out.is_file());
    assert!(out.file_name().unwrap().to_string_lossy().starts_with("001_scan_"));
}

#[test]
fn probe_without_interpreter_never_spawns() {
    let runner = Arc::new(FakeRunner {
        interpreter: None,
        ..Default::default()
    });
    let engine = engine(EngineKind::Primary, &runner);

    let probe = engine.probe(false);
    assert!(!probe.available);
    assert_eq!(probe.exit_code, -1);
    assert_eq!(runner.probes.load(Ordering::SeqCst), 0);

    let tmp = tempfile::tempdir().unwrap();
    let ins = inputs(tmp.path(), &["a.doc"]);
    let err = engine.convert_batch(&ins, tmp.path()).unwrap_err();
    assert!(
        matches!(err, ConversionError::CapabilityUnavailable { .. }),
        "{err:?}"
    );
}

#[test]
fn probe_is_cached_until_forced() {
    let runner = Arc::new(FakeRunner::default());
    let engine = engine(EngineKind::Primary, &runner);

    assert!(engine.probe(false).available);
    assert!(engine.probe(false).available);
    assert_eq!(runner.probes.load(Ordering::SeqCst), 1);

    engine.probe(true);
    assert_eq!(runner.probes.load(Ordering::SeqCst), 2);
    assert!(engine.last_probe().is_some());
}

#[test]
fn failed_probe_keeps_the_diagnostics() {
    let runner = Arc::new(FakeRunner {
        probe_ok: false,
        ..Default::default()
    });
    let engine = engine(EngineKind::Secondary, &runner);

    let probe = engine.probe(false);
    assert!(!probe.available);
    assert_eq!(probe.exit_code, 1);
    assert!(probe.stderr.contains("class not registered"));
}

#[test]
fn convert_one_is_a_batch_of_one() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let engine = engine(EngineKind::Secondary, &runner);
    let ins = inputs(tmp.path(), &["memo.doc"]);

    let out = engine.convert_one(&ins[0], &tmp.path().join("one")).unwrap();
    assert!(out.is_file());
    assert_eq!(runner.conversions.load(Ordering::SeqCst), 1);
}

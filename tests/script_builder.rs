mod common;

use docmerge::config::Config;
use docmerge::engine::EngineKind;
use docmerge::script::{
    failed_index, ComAutomationScripts, ConversionJob, PsLiteral, ScriptStrategy, MARKER,
    PDF_SAVE_ATTEMPTS,
};
use std::path::PathBuf;

fn job(input: &str, output: &str) -> ConversionJob {
    ConversionJob {
        input: PathBuf::from(input),
        output: PathBuf::from(output),
    }
}

#[test]
fn literal_doubles_every_single_quote_form() {
    assert_eq!(PsLiteral("plain.doc").to_string(), "'plain.doc'");
    assert_eq!(PsLiteral("O'Brien.doc").to_string(), "'O''Brien.doc'");
    assert_eq!(
        PsLiteral("\u{2018}draft\u{2019}.doc").to_string(),
        "'\u{2018}\u{2018}draft\u{2019}\u{2019}.doc'"
    );
    assert_eq!(PsLiteral("$(rm -r /)").to_string(), "'$(rm -r /)'");
}

#[test]
fn batch_script_lists_jobs_in_order_and_escapes_paths() {
    let cfg = Config::default();
    let d = cfg.engines.primary.descriptor(EngineKind::Primary);
    let jobs = vec![
        job(r"C:\in\a.doc", r"C:\tmp\001_a.docx"),
        job(r"C:\in\it's.doc", r"C:\tmp\002_it's.docx"),
        job(r"C:\in\c.doc", r"C:\tmp\003_c.docx"),
    ];
    let script = ComAutomationScripts.batch(&d, &jobs);

    let parsed = common::parse_jobs(&script);
    let expected: Vec<_> = jobs.iter().map(|j| (j.input.clone(), j.output.clone())).collect();
    assert_eq!(parsed, expected);
    assert!(script.contains(r"'C:\in\it''s.doc'"));

    assert!(script.contains("New-Object -ComObject 'Word.Application'"));
    assert!(script.contains("$app.Visible = $false"));
    assert!(script.contains("$app.DisplayAlerts = 0"));
    assert!(script.contains("ProtectedViewWindows.Open"));
    assert!(script.contains("$fmts = @(16, 12)"));
    assert!(script.contains("SaveAs2"));
    assert!(script.contains(&format!("{MARKER} failed-index")));
    assert!(script.contains("$app.Quit()"));
    assert!(script.trim_end().ends_with("exit $exitCode"));
    assert!(!script.contains("Write-Error"));
}

#[test]
fn secondary_product_uses_its_own_id_and_format_order() {
    let cfg = Config::default();
    let d = cfg.engines.secondary.descriptor(EngineKind::Secondary);
    let script = ComAutomationScripts.batch(&d, &[job("a.doc", "a.docx")]);
    assert!(script.contains("New-Object -ComObject 'kwps.application'"));
    assert!(script.contains("$fmts = @(12, 16)"));
}

#[test]
fn pdf_script_is_visible_and_retries_saves() {
    let cfg = Config::default();
    let d = cfg.engines.primary.descriptor(EngineKind::Primary);
    let script = ComAutomationScripts.pdf(&d, &job(r"C:\in\scan.pdf", r"C:\tmp\001_scan.docx"));

    assert_eq!(
        common::parse_jobs(&script),
        vec![(
            PathBuf::from(r"C:\in\scan.pdf"),
            PathBuf::from(r"C:\tmp\001_scan.docx")
        )]
    );
    assert!(script.contains("$app.Visible = $true"));
    assert!(script.contains("Repaginate"));
    assert!(script.contains("ActiveDocument"));
    assert!(script.contains(&format!("$i -le {PDF_SAVE_ATTEMPTS}")));
    assert!(script.contains("Start-Sleep -Seconds (2 * $i)"));
    assert!(script.contains("$doc.SaveAs("));
    assert!(!script.contains("Write-Error"));
}

#[test]
fn probe_script_only_instantiates_and_releases() {
    let cfg = Config::default();
    let d = cfg.engines.primary.descriptor(EngineKind::Primary);
    let script = ComAutomationScripts.probe(&d);
    assert!(common::parse_jobs(&script).is_empty());
    assert!(script.contains("$app.Visible = $false"));
    assert!(script.contains("FinalReleaseComObject"));
    assert!(!script.contains("Documents.Open"));
}

#[test]
fn failed_index_reads_the_batch_marker() {
    let stderr = format!("noise\n{MARKER} failed-index 2\n[conversion error] boom");
    assert_eq!(failed_index(&stderr), Some(2));
    assert_eq!(failed_index("[conversion error] boom"), None);
    assert_eq!(failed_index(&format!("{MARKER} failed-index 0")), None);
    assert_eq!(failed_index(&format!("{MARKER} failed-index x")), None);
}

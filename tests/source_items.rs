use docmerge::source::{ItemStatus, SourceItem, SourceKind};
use std::path::Path;

#[test]
fn kinds_come_from_the_extension() {
    assert_eq!(SourceKind::from_path(Path::new("a.DOC")), Some(SourceKind::LegacyDoc));
    assert_eq!(SourceKind::from_path(Path::new("a.docx")), Some(SourceKind::XmlDoc));
    assert_eq!(SourceKind::from_path(Path::new("a.Pdf")), Some(SourceKind::Pdf));
    assert_eq!(SourceKind::from_path(Path::new("a.jpeg")), Some(SourceKind::Image));
    assert_eq!(SourceKind::from_path(Path::new("a.txt")), None);
    assert_eq!(SourceKind::from_path(Path::new("noext")), None);
    assert!(SourceKind::LegacyDoc.needs_engine());
    assert!(SourceKind::Pdf.needs_engine());
    assert!(!SourceKind::Image.needs_engine());
}

#[test]
fn missing_files_are_flagged_not_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    let present = tmp.path().join("here.docx");
    std::fs::write(&present, b"x").unwrap();

    let ok = SourceItem::from_path(&present).unwrap();
    assert_eq!(ok.status, ItemStatus::Ok);
    assert_eq!(ok.name, "here.docx");
    assert!(ok.checked && ok.is_mergeable());

    let gone = SourceItem::from_path(tmp.path().join("gone.doc")).unwrap();
    assert!(gone.is_missing());
    assert!(!gone.is_mergeable());

    assert!(SourceItem::from_path(tmp.path().join("notes.txt")).is_none());
}

#[test]
fn kinds_serialize_in_upper_snake_case() {
    assert_eq!(
        serde_json::to_string(&SourceKind::LegacyDoc).unwrap(),
        "\"LEGACY_DOC\""
    );
}

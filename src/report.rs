use crate::source::SourceKind;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    pub sha256: String,
    pub engine: Option<String>,
    pub started: String,
    pub finished: String,
    pub items: Vec<ItemReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// 1-based position in the merged document.
    pub index: usize,
    pub label: String,
    pub kind: SourceKind,
    /// `embedded`, `image`, or the engine that converted the item.
    pub via: String,
}

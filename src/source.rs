use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    LegacyDoc,
    XmlDoc,
    Image,
    Pdf,
}

impl SourceKind {
    /// Classifies by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "doc" => Some(Self::LegacyDoc),
            "docx" => Some(Self::XmlDoc),
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" | "webp" => Some(Self::Image),
            _ => None,
        }
    }

    /// Kinds that need an automation engine before they can be assembled.
    pub fn needs_engine(&self) -> bool {
        matches!(self, Self::LegacyDoc | Self::Pdf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Ok,
    Missing,
}

/// One input as supplied by the scanning/UI side. Read-only to the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub path: PathBuf,
    pub name: String,
    pub kind: SourceKind,
    pub checked: bool,
    pub status: ItemStatus,
}

impl SourceItem {
    /// Builds a checked item from a path, flagging it missing when the file
    /// is not there. Returns `None` for unsupported extensions.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = SourceKind::from_path(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let status = if path.is_file() {
            ItemStatus::Ok
        } else {
            ItemStatus::Missing
        };
        Some(Self {
            path,
            name,
            kind,
            checked: true,
            status,
        })
    }

    pub fn is_missing(&self) -> bool {
        self.status == ItemStatus::Missing
    }

    pub fn is_mergeable(&self) -> bool {
        self.checked && !self.is_missing()
    }
}

use crate::engine::EngineKind;
use crate::error::ConversionError;
use crate::selector::{EngineSelector, ProbeSummary, Selection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// User-facing engine preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConverterMode {
    #[default]
    Auto,
    PrimaryOnly,
    SecondaryOnly,
}

impl ConverterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::PrimaryOnly => "primary_only",
            Self::SecondaryOnly => "secondary_only",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "automatic (primary first)",
            Self::PrimaryOnly => "primary engine only",
            Self::SecondaryOnly => "secondary engine only",
        }
    }

    /// Lenient parse for config and CLI values; blank or unknown means auto.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "primary_only" | "primary" | "word_only" | "word" => Self::PrimaryOnly,
            "secondary_only" | "secondary" | "wps_only" | "wps" => Self::SecondaryOnly,
            _ => Self::Auto,
        }
    }
}

impl From<String> for ConverterMode {
    fn from(raw: String) -> Self {
        Self::parse_lenient(&raw)
    }
}

impl From<ConverterMode> for String {
    fn from(mode: ConverterMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for ConverterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub mode: ConverterMode,
    pub summary: Arc<ProbeSummary>,
    pub selection: Option<Selection>,
    pub error_message: Option<String>,
}

impl Resolution {
    pub fn message(&self) -> String {
        match (&self.selection, &self.error_message) {
            (Some(sel), _) => format!("using {} ({})", sel.engine.name(), self.mode.label()),
            (None, Some(msg)) => msg.clone(),
            (None, None) => "no conversion engine available".into(),
        }
    }
}

/// Applies a [`ConverterMode`] to the selector's probe snapshot.
pub struct EngineResolver {
    selector: Arc<EngineSelector>,
}

impl EngineResolver {
    pub fn new(selector: Arc<EngineSelector>) -> Self {
        Self { selector }
    }

    pub fn selector(&self) -> &EngineSelector {
        &self.selector
    }

    pub fn resolve(&self, mode: ConverterMode, force_refresh: bool) -> Resolution {
        let summary = self.selector.probe_all(force_refresh);
        let primary_name = &summary.primary.probe.engine;
        let secondary_name = &summary.secondary.probe.engine;

        let (pick, error_message) = match mode {
            ConverterMode::Auto => match summary.auto {
                Some(kind) => (Some(kind), None),
                None => (
                    None,
                    Some(format!(
                        "neither {primary_name} nor {secondary_name} is available (mode: {})",
                        mode.label()
                    )),
                ),
            },
            ConverterMode::PrimaryOnly => only(&summary, EngineKind::Primary, mode),
            ConverterMode::SecondaryOnly => only(&summary, EngineKind::Secondary, mode),
        };

        Resolution {
            mode,
            selection: pick.map(|kind| self.selector.select(&summary, kind)),
            summary,
            error_message,
        }
    }

    pub fn require_selection(
        &self,
        mode: ConverterMode,
        force_refresh: bool,
    ) -> Result<Selection, ConversionError> {
        let resolution = self.resolve(mode, force_refresh);
        let message = resolution.message();
        match resolution.selection {
            Some(selection) => Ok(selection),
            None => {
                let diagnostics = match mode {
                    ConverterMode::SecondaryOnly => resolution.summary.secondary.probe.diagnostics(),
                    _ => resolution.summary.primary.probe.diagnostics(),
                };
                Err(ConversionError::CapabilityUnavailable {
                    engine: mode.label().to_string(),
                    reason: message,
                    diagnostics,
                })
            }
        }
    }
}

fn only(
    summary: &ProbeSummary,
    kind: EngineKind,
    mode: ConverterMode,
) -> (Option<EngineKind>, Option<String>) {
    let status = summary.status(kind);
    if status.available() {
        (Some(kind), None)
    } else {
        (
            None,
            Some(format!(
                "{} is unavailable: {} (mode: {})",
                status.probe.engine,
                status.probe.message,
                mode.label()
            )),
        )
    }
}

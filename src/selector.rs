use crate::cache::TtlCache;
use crate::config::Config;
use crate::engine::{ComEngine, ConversionEngine, EngineKind, ProbeResult, SessionCoordinator};
use crate::script::ScriptRunner;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Probe outcome of one engine as shown to callers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub kind: EngineKind,
    pub probe: ProbeResult,
}

impl EngineStatus {
    pub fn available(&self) -> bool {
        self.probe.available
    }
}

/// A chosen engine plus the probe that justified it.
#[derive(Clone)]
pub struct Selection {
    pub engine: Arc<dyn ConversionEngine>,
    pub status: EngineStatus,
}

impl Selection {
    pub fn kind(&self) -> EngineKind {
        self.status.kind
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("engine", &self.engine.name())
            .field("status", &self.status)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    pub primary: EngineStatus,
    pub secondary: EngineStatus,
    /// Primary when available, else secondary, else none.
    pub auto: Option<EngineKind>,
}

impl ProbeSummary {
    pub fn any_available(&self) -> bool {
        self.primary.available() || self.secondary.available()
    }

    pub fn status(&self, kind: EngineKind) -> &EngineStatus {
        match kind {
            EngineKind::Primary => &self.primary,
            EngineKind::Secondary => &self.secondary,
        }
    }
}

/// Probes both engines and caches the combined snapshot.
pub struct EngineSelector {
    primary: Arc<dyn ConversionEngine>,
    secondary: Arc<dyn ConversionEngine>,
    cache: TtlCache<Arc<ProbeSummary>>,
}

impl EngineSelector {
    pub fn new(
        primary: Arc<dyn ConversionEngine>,
        secondary: Arc<dyn ConversionEngine>,
        ttl: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            cache: TtlCache::new(ttl),
        }
    }

    /// Builds both configured automation engines over one runner and one
    /// session coordinator.
    pub fn from_config(
        cfg: &Config,
        runner: Arc<dyn ScriptRunner>,
        sessions: Arc<SessionCoordinator>,
    ) -> Self {
        let ttl = cfg.engines.probe_ttl();
        let timeouts = cfg.engines.timeouts();
        let primary = ComEngine::new(
            cfg.engines.primary.descriptor(EngineKind::Primary),
            Arc::clone(&runner),
            Arc::clone(&sessions),
            timeouts,
            ttl,
        );
        let secondary = ComEngine::new(
            cfg.engines.secondary.descriptor(EngineKind::Secondary),
            runner,
            sessions,
            timeouts,
            ttl,
        );
        Self::new(Arc::new(primary), Arc::new(secondary), ttl)
    }

    pub fn engine(&self, kind: EngineKind) -> Arc<dyn ConversionEngine> {
        match kind {
            EngineKind::Primary => Arc::clone(&self.primary),
            EngineKind::Secondary => Arc::clone(&self.secondary),
        }
    }

    pub fn probe_all(&self, force_refresh: bool) -> Arc<ProbeSummary> {
        let snapshot = self.cache.get_or_refresh(force_refresh, || {
            let primary = EngineStatus {
                kind: EngineKind::Primary,
                probe: self.primary.probe(force_refresh),
            };
            let secondary = EngineStatus {
                kind: EngineKind::Secondary,
                probe: self.secondary.probe(force_refresh),
            };
            let auto = auto_select(&primary, &secondary);
            info!(
                primary = primary.available(),
                secondary = secondary.available(),
                auto = ?auto,
                "engine probe"
            );
            Arc::new(ProbeSummary {
                primary,
                secondary,
                auto,
            })
        });
        Arc::clone(&snapshot.value)
    }

    /// The auto-selected engine from the current snapshot.
    pub fn auto_selection(&self, force_refresh: bool) -> Option<Selection> {
        let summary = self.probe_all(force_refresh);
        summary.auto.map(|kind| self.select(&summary, kind))
    }

    pub(crate) fn select(&self, summary: &ProbeSummary, kind: EngineKind) -> Selection {
        Selection {
            engine: self.engine(kind),
            status: summary.status(kind).clone(),
        }
    }
}

pub fn auto_select(primary: &EngineStatus, secondary: &EngineStatus) -> Option<EngineKind> {
    if primary.available() {
        Some(EngineKind::Primary)
    } else if secondary.available() {
        Some(EngineKind::Secondary)
    } else {
        None
    }
}

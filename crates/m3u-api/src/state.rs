use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use m3u_core::{CheckConfig, CheckReport, FfprobeProbe, HttpSource, PlaylistSource, Probe};

/// Shared handler state: completed runs plus the probe and playlist source
/// used to serve new ones.
#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<DashMap<Uuid, Arc<CheckReport>>>,
    pub default_config: CheckConfig,
    pub probe: Arc<dyn Probe>,
    pub source: Arc<dyn PlaylistSource>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            default_config: CheckConfig::default(),
            probe: Arc::new(FfprobeProbe::default()),
            source: Arc::new(HttpSource::default()),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn PlaylistSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_default_config(mut self, config: CheckConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn run(&self, id: &Uuid) -> Option<Arc<CheckReport>> {
        self.runs.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn store(&self, report: CheckReport) -> Arc<CheckReport> {
        let report = Arc::new(report);
        self.runs.insert(report.id, Arc::clone(&report));
        report
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

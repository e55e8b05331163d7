//! Fakes shared by the cycle and handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Config;
use crate::dream::DreamReplay;
use crate::error::Result;
use crate::lookup::KnowledgeLookup;
use crate::metrics::{MetricsProbe, SystemMetrics};
use crate::senses::Capabilities;
use crate::state::{StateStore, StoreLimits};
use crate::Guardian;

/// Readings that tests can change between cycles.
#[derive(Clone)]
pub struct ScriptedMetrics(Arc<Mutex<(f64, f64, Option<f64>)>>);

impl ScriptedMetrics {
    pub fn new(cpu: f64, ram: f64, battery: Option<f64>) -> Self {
        Self(Arc::new(Mutex::new((cpu, ram, battery))))
    }

    pub fn set(&self, cpu: f64, ram: f64, battery: Option<f64>) {
        *self.0.lock().unwrap() = (cpu, ram, battery);
    }
}

impl SystemMetrics for ScriptedMetrics {
    fn cpu_percent(&self) -> Result<f64> {
        Ok(self.0.lock().unwrap().0)
    }
    fn ram_percent(&self) -> Result<f64> {
        Ok(self.0.lock().unwrap().1)
    }
    fn battery_percent(&self) -> Option<f64> {
        self.0.lock().unwrap().2
    }
}

/// Answers from a fixed table.
#[derive(Default)]
pub struct TableLookup(pub HashMap<String, String>);

#[async_trait]
impl KnowledgeLookup for TableLookup {
    async fn lookup(&self, topic: &str) -> Option<String> {
        self.0.get(topic).cloned()
    }
}

/// Config with probabilistic triggers off and state under `dir`.
pub fn quiet_config(dir: &std::path::Path) -> Config {
    Config {
        reflection_probability: 0.0,
        dream_probability: 0.0,
        autosave_cycles: 0,
        project_root: dir.to_path_buf(),
        ..Config::default()
    }
}

pub fn guardian_with(
    config: Config,
    store: StateStore,
    metrics: ScriptedMetrics,
    capabilities: Capabilities,
) -> Guardian {
    let threshold = config.instability_threshold;
    Guardian::new(config, store, MetricsProbe::new(Box::new(metrics)), capabilities)
        .with_dreamer(DreamReplay::with_seed(threshold, 11))
}

pub fn empty_store() -> StateStore {
    StateStore::new(StoreLimits::default())
}

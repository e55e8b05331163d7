//! Configuration — YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "guardian.yaml";

/// Tuning for the emotion engine. Every constant the update rules use lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Linear decay per elapsed second
    pub decay_rate: f64,
    /// CPU or RAM percentage above which the host counts as overloaded
    pub overload_percent: f64,
    /// Battery percentage below which the host counts as low on power
    pub low_battery_percent: f64,
    /// stress up / happiness down on overload
    pub overload_step: f64,
    /// anxiety up / confidence down on low battery
    pub low_battery_step: f64,
    /// happiness up when nothing is wrong
    pub recovery_step: f64,
    pub overload_energy: f64,
    pub low_battery_energy: f64,
    /// Multiplier applied to the energy limit on a nominal cycle (capped at 1.0)
    pub energy_recovery: f64,
    /// curiosity up when the camera sees something
    pub visual_curiosity_step: f64,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.015,
            overload_percent: 80.0,
            low_battery_percent: 20.0,
            overload_step: 0.1,
            low_battery_step: 0.1,
            recovery_step: 0.05,
            overload_energy: 0.5,
            low_battery_energy: 0.3,
            energy_recovery: 1.1,
            visual_curiosity_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the state file (relative to the project root unless absolute)
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Seconds the background loop sleeps between cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_seconds: u64,

    /// Window over which CPU load is averaged
    #[serde(default = "default_cpu_sample_millis")]
    pub cpu_sample_millis: u64,

    /// Chance per cycle of a standalone reflection
    #[serde(default = "default_reflection_probability")]
    pub reflection_probability: f64,

    /// Chance per cycle of a dream replay
    #[serde(default = "default_dream_probability")]
    pub dream_probability: f64,

    /// anxiety + fear above this flags instability
    #[serde(default = "default_instability_threshold")]
    pub instability_threshold: f64,

    /// In-memory memory log bound
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// Memory entries written to disk
    #[serde(default = "default_persisted_memory")]
    pub persisted_memory: usize,

    #[serde(default = "default_resource_history")]
    pub resource_history_capacity: usize,

    /// Recursion counter wraps from this value back to 1
    #[serde(default = "default_recursion_wrap")]
    pub recursion_wrap: u32,

    /// Save every N background cycles (0 disables)
    #[serde(default = "default_autosave_cycles")]
    pub autosave_cycles: u32,

    /// Wikipedia REST base URL
    #[serde(default = "default_lookup_base_url")]
    pub lookup_base_url: String,

    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_seconds: u64,

    #[serde(default)]
    pub emotion: EmotionConfig,

    /// Resolved project root (set at load time, not serialized from YAML)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_state_dir() -> String {
    "guardian_data".into()
}
fn default_state_file() -> String {
    "state.json".into()
}
fn default_cycle_interval() -> u64 {
    5
}
fn default_cpu_sample_millis() -> u64 {
    1000
}
fn default_reflection_probability() -> f64 {
    0.1
}
fn default_dream_probability() -> f64 {
    0.05
}
fn default_instability_threshold() -> f64 {
    0.6
}
fn default_memory_capacity() -> usize {
    1000
}
fn default_persisted_memory() -> usize {
    100
}
fn default_resource_history() -> usize {
    20
}
fn default_recursion_wrap() -> u32 {
    100
}
fn default_autosave_cycles() -> u32 {
    12
}
fn default_lookup_base_url() -> String {
    "https://en.wikipedia.org/api/rest_v1".into()
}
fn default_lookup_timeout() -> u64 {
    5
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config =
            serde_yaml::from_str(&content).context("Failed to parse guardian.yaml")?;

        config.project_root = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf()
            .canonicalize()
            .unwrap_or_else(|_| {
                config_path
                    .parent()
                    .unwrap_or(Path::new("."))
                    .to_path_buf()
            });

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `project_root/guardian.yaml` if present, otherwise defaults (env overrides still apply).
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILENAME);
        if config_path.is_file() {
            return Self::load(&config_path);
        }

        let mut config = Config {
            project_root: project_root.to_path_buf(),
            ..Config::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("GUARDIAN_STATE_DIR") {
            self.state_dir = dir;
        }
        if let Ok(secs) = std::env::var("GUARDIAN_CYCLE_SECONDS") {
            self.cycle_interval_seconds = secs
                .parse()
                .with_context(|| format!("GUARDIAN_CYCLE_SECONDS is not a number: {}", secs))?;
        }
        if let Ok(url) = std::env::var("GUARDIAN_LOOKUP_URL") {
            self.lookup_base_url = url;
        }
        if let Ok(n) = std::env::var("GUARDIAN_AUTOSAVE_CYCLES") {
            self.autosave_cycles = n
                .parse()
                .with_context(|| format!("GUARDIAN_AUTOSAVE_CYCLES is not a number: {}", n))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("reflection_probability", self.reflection_probability),
            ("dream_probability", self.dream_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, p);
            }
        }
        if self.memory_capacity == 0 || self.persisted_memory == 0 {
            anyhow::bail!("memory capacities must be greater than zero");
        }
        if self.resource_history_capacity == 0 {
            anyhow::bail!("resource_history_capacity must be greater than zero");
        }
        if self.recursion_wrap == 0 {
            anyhow::bail!("recursion_wrap must be greater than zero");
        }
        if self.emotion.decay_rate < 0.0 {
            anyhow::bail!("emotion.decay_rate must not be negative");
        }
        Ok(())
    }

    /// Full path of the persisted state document.
    pub fn state_path(&self) -> PathBuf {
        let dir = Path::new(&self.state_dir);
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.project_root.join(dir)
        };
        dir.join(&self.state_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            state_file: default_state_file(),
            cycle_interval_seconds: default_cycle_interval(),
            cpu_sample_millis: default_cpu_sample_millis(),
            reflection_probability: default_reflection_probability(),
            dream_probability: default_dream_probability(),
            instability_threshold: default_instability_threshold(),
            memory_capacity: default_memory_capacity(),
            persisted_memory: default_persisted_memory(),
            resource_history_capacity: default_resource_history(),
            recursion_wrap: default_recursion_wrap(),
            autosave_cycles: default_autosave_cycles(),
            lookup_base_url: default_lookup_base_url(),
            lookup_timeout_seconds: default_lookup_timeout(),
            emotion: EmotionConfig::default(),
            project_root: PathBuf::new(),
        }
    }
}

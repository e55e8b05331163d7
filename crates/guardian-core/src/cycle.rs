//! The update cycle and the background loop that drives it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dream::{Dream, DreamReplay};
use crate::emotion::{Emotion, EmotionEngine};
use crate::error::{GuardianError, Result};
use crate::events::GuardianEvent;
use crate::metrics::{MetricsProbe, DEFAULT_BATTERY};
use crate::senses::{Capabilities, SensoryReading};
use crate::state::{write_snapshot, SharedState, StateStore, StoreLimits};
use crate::types::*;

/// Owns the shared state and every component that updates it.
///
/// Shared as `Arc<Guardian>` between the background loop and the request
/// handler. All state mutation goes through the one `SharedState` mutex.
pub struct Guardian {
    state: SharedState,
    probe: Arc<MetricsProbe>,
    engine: EmotionEngine,
    dreamer: Mutex<DreamReplay>,
    capabilities: Capabilities,
    config: Config,
    state_path: PathBuf,
    interval: Duration,
    event_tx: broadcast::Sender<GuardianEvent>,
    save_lock: tokio::sync::Mutex<()>,
}

impl Guardian {
    pub fn new(
        config: Config,
        store: StateStore,
        probe: MetricsProbe,
        capabilities: Capabilities,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            state: store.into_shared(),
            probe: Arc::new(probe),
            engine: EmotionEngine::new(config.emotion.clone()),
            dreamer: Mutex::new(DreamReplay::new(config.instability_threshold)),
            capabilities,
            state_path: config.state_path(),
            interval: Duration::from_secs(config.cycle_interval_seconds),
            config,
            event_tx,
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Guardian on the real host with an empty store.
    pub fn from_config(config: Config, capabilities: Capabilities) -> Self {
        let store = StateStore::new(StoreLimits::from(&config));
        let probe = MetricsProbe::system(Duration::from_millis(config.cpu_sample_millis));
        Self::new(config, store, probe, capabilities)
    }

    pub fn with_dreamer(mut self, dreamer: DreamReplay) -> Self {
        self.dreamer = Mutex::new(dreamer);
        self
    }

    /// Override the sleep between background cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardianEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn state_path(&self) -> &std::path::Path {
        &self.state_path
    }

    pub(crate) fn broadcast(&self, event: GuardianEvent) {
        let _ = self.event_tx.send(event);
    }

    fn dreamer(&self) -> MutexGuard<'_, DreamReplay> {
        self.dreamer.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Persistence ──

    /// Restore the saved snapshot. Failures are logged and the guardian starts empty.
    pub async fn load_state(&self) -> bool {
        let mut store = self.state.lock().await;
        match store.load(&self.state_path) {
            Ok(restored) => restored,
            Err(e) => {
                warn!("Could not load state, starting fresh: {}", e);
                false
            }
        }
    }

    /// Snapshot under the state lock, then write off the runtime. Saves are
    /// serialized so an older snapshot never lands after a newer one.
    pub async fn save(&self) -> Result<()> {
        let _saving = self.save_lock.lock().await;
        let snapshot = self.state.lock().await.snapshot();
        let path = self.state_path.clone();
        tokio::task::spawn_blocking(move || write_snapshot(&path, &snapshot))
            .await
            .map_err(|e| GuardianError::persistence(&self.state_path, std::io::Error::other(e)))??;
        info!("State saved to {}", self.state_path.display());
        self.broadcast(GuardianEvent::Saved {
            path: self.state_path.display().to_string(),
        });
        Ok(())
    }

    // ── Cycle ──

    /// Read metrics and senses off the async runtime; both may block.
    async fn sense(&self) -> (ResourceSample, SensoryReading) {
        let probe = self.probe.clone();
        let capabilities = self.capabilities.clone();
        match tokio::task::spawn_blocking(move || (probe.sample(), capabilities.sense())).await {
            Ok(reading) => reading,
            Err(e) => {
                error!("Sensing task failed: {}", e);
                (
                    ResourceSample::new(0.0, 0.0, DEFAULT_BATTERY),
                    SensoryReading::default(),
                )
            }
        }
    }

    fn apply_senses(&self, store: &mut StateStore, senses: SensoryReading) {
        let visual = senses.visual_activity.unwrap_or(false);
        if visual {
            store
                .emotions_mut()
                .nudge(Emotion::Curiosity, self.config.emotion.visual_curiosity_step);
        }
        store.set_senses(visual, senses.audio_detected.unwrap_or(false));
    }

    /// One full update: sense, apply emotions, maybe reflect, maybe dream, bookkeeping.
    pub async fn run_cycle(&self, source: CycleSource) -> CycleReport {
        let (sample, senses) = self.sense().await;

        let mut events = Vec::new();
        let mut dreamed = None;
        let report = {
            let mut store = self.state.lock().await;

            let elapsed = store.take_elapsed(Utc::now());
            let condition = self.engine.classify(&sample);
            let emotions = self.engine.apply(store.emotions(), &sample, elapsed);
            let energy = self.engine.energy_limit(store.energy_limit(), &sample);
            store.set_energy_limit(energy);
            store.record(sample.clone(), emotions);
            self.apply_senses(&mut store, senses);

            {
                let mut dreamer = self.dreamer();
                if let Some(r) = dreamer.maybe_reflect(&mut store, self.config.reflection_probability)
                {
                    events.push(GuardianEvent::Reflection(r));
                }
                if let Some(d) = dreamer.maybe_trigger(&mut store, self.config.dream_probability) {
                    dreamed = Some(d.fragment.clone());
                    events.push(GuardianEvent::Dream(d));
                }
            }

            let recursion_count = store.advance_recursion();
            CycleReport {
                source,
                recursion_count,
                energy_limit: store.energy_limit(),
                condition,
                sample,
            }
        };

        debug!(
            "Cycle {} ({:?}): {}, energy {:.2}",
            report.recursion_count, source, report.condition, report.energy_limit
        );

        if let Some(fragment) = dreamed {
            self.render_dream(fragment).await;
        }
        for event in events {
            self.broadcast(event);
        }
        self.broadcast(GuardianEvent::Cycle(report.clone()));
        report
    }

    /// Replay a memory now, regardless of probability.
    pub async fn force_dream(&self) -> Option<Dream> {
        let mut store = self.state.lock().await;
        let dream = self.dreamer().dream(&mut store);
        drop(store);
        let dream = dream?;
        self.render_dream(dream.fragment.clone()).await;
        self.broadcast(GuardianEvent::Dream(dream.clone()));
        Some(dream)
    }

    async fn render_dream(&self, fragment: String) {
        if self.capabilities.image.is_none() {
            return;
        }
        let capabilities = self.capabilities.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || capabilities.render_dream(&fragment)).await
        {
            error!("Dream rendering task failed: {}", e);
        }
    }

    // ── Main loop ──

    /// Cycle forever on the configured cadence, saving every `autosave_cycles`.
    pub async fn run(self: Arc<Self>) {
        info!(
            "Guardian loop starting (every {:?}, autosave every {} cycles)",
            self.interval, self.config.autosave_cycles
        );
        let mut cycles_since_save = 0u32;

        loop {
            self.run_cycle(CycleSource::Background).await;

            cycles_since_save += 1;
            if self.config.autosave_cycles > 0 && cycles_since_save >= self.config.autosave_cycles {
                if let Err(e) = self.save().await {
                    error!("Periodic save failed: {}", e);
                }
                cycles_since_save = 0;
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::senses::Camera;
    use crate::testing::*;

    fn seeded_store(happiness: f64, stress: f64) -> StateStore {
        let mut store = empty_store();
        store.emotions_mut().set(Emotion::Happiness, happiness);
        store.emotions_mut().set(Emotion::Stress, stress);
        store
    }

    #[tokio::test]
    async fn test_cpu_overload_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let g = guardian_with(
            quiet_config(dir.path()),
            seeded_store(0.5, 0.2),
            ScriptedMetrics::new(90.0, 50.0, Some(100.0)),
            Capabilities::none(),
        );

        let report = g.run_cycle(CycleSource::Background).await;
        assert_eq!(report.energy_limit, 0.5);

        let state = g.state();
        let store = state.lock().await;
        let stress = store.emotions().get(Emotion::Stress);
        let happiness = store.emotions().get(Emotion::Happiness);
        assert!(stress > 0.2 && stress <= 1.0);
        assert!(happiness < 0.5 && happiness >= 0.0);
    }

    #[tokio::test]
    async fn test_low_battery_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let g = guardian_with(
            quiet_config(dir.path()),
            empty_store(),
            ScriptedMetrics::new(10.0, 10.0, Some(15.0)),
            Capabilities::none(),
        );

        let report = g.run_cycle(CycleSource::Background).await;
        assert_eq!(report.energy_limit, 0.3);

        let state = g.state();
        let store = state.lock().await;
        assert!(store.emotions().get(Emotion::Anxiety) > 0.1);
        assert!(store.emotions().get(Emotion::Confidence) < 0.5);
    }

    #[tokio::test]
    async fn test_nominal_cycle_recovers_energy() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store();
        store.set_energy_limit(0.9);
        let g = guardian_with(
            quiet_config(dir.path()),
            store,
            ScriptedMetrics::new(10.0, 10.0, Some(100.0)),
            Capabilities::none(),
        );

        let report = g.run_cycle(CycleSource::Background).await;
        assert!((report.energy_limit - 0.99).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recursion_wraps_after_hundred() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store();
        for _ in 0..100 {
            store.advance_recursion();
        }
        let g = guardian_with(
            quiet_config(dir.path()),
            store,
            ScriptedMetrics::new(10.0, 10.0, None),
            Capabilities::none(),
        );

        let report = g.run_cycle(CycleSource::Request).await;
        assert_eq!(report.recursion_count, 1);
    }

    #[tokio::test]
    async fn test_cycle_records_history_and_broadcasts() {
        let dir = tempfile::tempdir().unwrap();
        let g = guardian_with(
            quiet_config(dir.path()),
            empty_store(),
            ScriptedMetrics::new(33.0, 44.0, None),
            Capabilities::none(),
        );
        let mut rx = g.subscribe();

        for _ in 0..25 {
            g.run_cycle(CycleSource::Background).await;
        }
        {
            let state = g.state();
            let store = state.lock().await;
            assert_eq!(store.resource_history().len(), 20);
            assert_eq!(store.perception().battery_level, 100.0);
            assert_eq!(store.recursion_count(), 25);
        }

        match rx.recv().await.unwrap() {
            GuardianEvent::Cycle(report) => {
                assert_eq!(report.recursion_count, 1);
                assert_eq!(report.sample.cpu_percent, 33.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_certain_dream_fires_during_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            dream_probability: 1.0,
            ..quiet_config(dir.path())
        };
        let mut store = empty_store();
        store.remember("fact A");
        let g = guardian_with(
            config,
            store,
            ScriptedMetrics::new(10.0, 10.0, None),
            Capabilities::none(),
        );

        g.run_cycle(CycleSource::Background).await;
        let state = g.state();
        let store = state.lock().await;
        assert_eq!(store.memory().len(), 2);
        assert_eq!(store.memory()[1], "fact A - processed in dream-state");
        assert_eq!(store.reflections().len(), 1);
    }

    struct AlwaysSees;

    impl Camera for AlwaysSees {
        fn is_available(&self) -> bool {
            true
        }
        fn capture_frame(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_camera_activity_raises_curiosity() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quiet_config(dir.path());
        config.emotion.decay_rate = 0.0;
        let g = guardian_with(
            config,
            empty_store(),
            ScriptedMetrics::new(10.0, 10.0, None),
            Capabilities::none().with_camera(Arc::new(AlwaysSees)),
        );

        g.run_cycle(CycleSource::Background).await;
        let state = g.state();
        let store = state.lock().await;
        assert!(store.perception().visual_activity);
        assert!((store.emotions().get(Emotion::Curiosity) - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_background_loop_autosaves() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            autosave_cycles: 1,
            ..quiet_config(dir.path())
        };
        let g = Arc::new(
            guardian_with(
                config,
                empty_store(),
                ScriptedMetrics::new(10.0, 10.0, None),
                Capabilities::none(),
            )
            .with_interval(Duration::from_millis(5)),
        );
        let path = g.state_path().to_path_buf();

        let handle = g.spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(path.is_file());
        let mut reloaded = empty_store();
        assert!(reloaded.load(&path).unwrap());
        assert!(reloaded.recursion_count() >= 1);
    }

    #[tokio::test]
    async fn test_save_and_reload_through_guardian() {
        let dir = tempfile::tempdir().unwrap();
        let g = guardian_with(
            quiet_config(dir.path()),
            empty_store(),
            ScriptedMetrics::new(10.0, 10.0, None),
            Capabilities::none(),
        );
        g.state().lock().await.remember("keep me");
        g.save().await.unwrap();

        let fresh = guardian_with(
            quiet_config(dir.path()),
            empty_store(),
            ScriptedMetrics::new(10.0, 10.0, None),
            Capabilities::none(),
        );
        assert!(fresh.load_state().await);
        assert_eq!(fresh.state().lock().await.memory()[0], "keep me");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let g = Arc::new(guardian_with(
            quiet_config(dir.path()),
            empty_store(),
            ScriptedMetrics::new(10.0, 10.0, None),
            Capabilities::none(),
        ));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let g = g.clone();
            tasks.push(tokio::spawn(async move {
                g.state().lock().await.remember(format!("note {}", i));
                g.save().await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        g.save().await.unwrap();

        let mut reloaded = empty_store();
        assert!(reloaded.load(g.state_path()).unwrap());
        assert_eq!(reloaded.memory().len(), 8);
        assert!(!g.state_path().with_file_name("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let config = quiet_config(dir.path());
        let path = config.state_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "garbage").unwrap();

        let g = guardian_with(
            config,
            empty_store(),
            ScriptedMetrics::new(10.0, 10.0, None),
            Capabilities::none(),
        );
        assert!(!g.load_state().await);
        assert!(g.state().lock().await.memory().is_empty());
    }
}

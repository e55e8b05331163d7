//! Dream replay and reflection.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::emotion::Emotion;
use crate::state::StateStore;
use crate::types::ReflectionNote;

pub const DREAM_MARKER: &str = " - processed in dream-state";

/// A completed dream: the replayed entry and what was derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dream {
    pub fragment: String,
    pub derived: String,
    pub reflection: Reflection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub note: ReflectionNote,
    /// anxiety + fear crossed the threshold and an instability entry was recorded
    pub unstable: bool,
}

pub struct DreamReplay {
    rng: StdRng,
    instability_threshold: f64,
}

impl DreamReplay {
    pub fn new(instability_threshold: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            instability_threshold,
        }
    }

    /// Deterministic draws, for tests and reproducible runs.
    pub fn with_seed(instability_threshold: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            instability_threshold,
        }
    }

    /// One uniform draw in [0, 1) compared against `probability`.
    pub fn roll(&mut self, probability: f64) -> bool {
        self.rng.gen::<f64>() < probability
    }

    pub fn maybe_trigger(&mut self, store: &mut StateStore, probability: f64) -> Option<Dream> {
        if self.roll(probability) {
            self.dream(store)
        } else {
            None
        }
    }

    pub fn maybe_reflect(&mut self, store: &mut StateStore, probability: f64) -> Option<Reflection> {
        if self.roll(probability) {
            Some(self.reflect(store))
        } else {
            None
        }
    }

    /// Replay one memory now. `None` when there is nothing to replay.
    pub fn dream(&mut self, store: &mut StateStore) -> Option<Dream> {
        let fragment = store
            .memory()
            .iter()
            .collect::<Vec<_>>()
            .choose(&mut self.rng)
            .map(|s| s.to_string())?;

        let derived = format!("{}{}", fragment, DREAM_MARKER);
        store.remember(derived.clone());
        store.learn(format!("dream_{}", store.recursion_count()), derived.clone());
        info!("Dreamed about: {}", fragment);

        let reflection = self.reflect(store);
        Some(Dream {
            fragment,
            derived,
            reflection,
        })
    }

    /// Snapshot anxiety and fear; flag instability above the threshold.
    pub fn reflect(&self, store: &mut StateStore) -> Reflection {
        let anxiety = store.emotions().get(Emotion::Anxiety);
        let fear = store.emotions().get(Emotion::Fear);
        let note = ReflectionNote {
            timestamp: Utc::now(),
            anxiety,
            fear,
        };
        store.note_reflection(note.clone());

        let unstable = anxiety + fear > self.instability_threshold;
        if unstable {
            warn!(
                "Instability: anxiety {:.2} + fear {:.2} above {:.2}",
                anxiety, fear, self.instability_threshold
            );
            store.remember(format!(
                "Instability detected: anxiety {:.2} and fear {:.2} exceed {:.2}",
                anxiety, fear, self.instability_threshold
            ));
        }
        Reflection { note, unstable }
    }
}

//! guardian-core — Pure domain logic, no UI.
//!
//! A long-lived agent that samples host load, keeps a bounded emotional
//! state that decays over time, occasionally replays memories as "dreams",
//! and persists a small JSON snapshot. Frontends drive it through
//! [`RequestHandler`] and watch it via [`events::GuardianEvent`].

pub mod config;
pub mod cycle;
pub mod dream;
pub mod emotion;
pub mod error;
pub mod events;
pub mod handler;
pub mod lookup;
pub mod metrics;
pub mod senses;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

pub use cycle::Guardian;
pub use error::{GuardianError, Result};
pub use handler::{Command, RequestHandler};

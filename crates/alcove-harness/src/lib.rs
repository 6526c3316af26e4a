//! Deterministic simulation harness for alcove rooms.
//!
//! Provides a seeded [`SimEnv`] (manual clock, ChaCha20 randomness), a
//! scripted [`SimWorld`] that drives the room engines against a real
//! store while recording a stable transcript, and invariant checks that
//! scenario and property tests run against final store state.
//!
//! The `alcove-sim` binary runs the canonical scenario with CLI-chosen
//! seed and participant count, logging the transcript.

#![forbid(unsafe_code)]

pub mod invariants;
pub mod sim_env;
pub mod world;

pub use invariants::{Violation, check_messages, check_room, check_store_state};
pub use sim_env::SimEnv;
pub use world::{ScenarioConfig, SimWorld};

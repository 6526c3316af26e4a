//! Scenario runner binary.
//!
//! # Usage
//!
//! ```bash
//! # Run the canonical scenario with the default seed
//! alcove-sim
//!
//! # Reproduce a specific run with verbose engine logging
//! alcove-sim --seed 7 --participants 5 --log-level debug
//! ```

use alcove_harness::{ScenarioConfig, SimWorld, check_store_state};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Deterministic alcove room scenario runner
#[derive(Parser, Debug)]
#[command(name = "alcove-sim")]
#[command(about = "Runs a scripted room scenario against the in-memory store")]
#[command(version)]
struct Args {
    /// Seed for the simulated clock and identities
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of provisioned participants (minimum 3)
    #[arg(long, default_value = "3")]
    participants: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, participants = args.participants, "scenario starting");

    let config = ScenarioConfig {
        seed: args.seed,
        participants: args.participants.max(3),
    };
    let mut world = SimWorld::new(config);
    world.run_single_use_invite_flow();

    if let Some(code) = world.room() {
        let violations = check_store_state(world.store(), code);
        for violation in &violations {
            tracing::error!(%violation, "invariant violated");
        }
        if !violations.is_empty() {
            return Err(format!("{} invariant violations", violations.len()).into());
        }
    }

    tracing::info!(steps = world.transcript().len(), "scenario complete");

    Ok(())
}

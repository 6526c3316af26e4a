//! Transcript snapshot for the canonical scenario.
//!
//! The transcript contains no random values or absolute timestamps, so
//! it is byte-stable across seeds and runs.

use alcove_harness::{ScenarioConfig, SimWorld, check_store_state};

#[test]
fn single_use_invite_flow() {
    let mut world = SimWorld::new(ScenarioConfig::default());
    world.run_single_use_invite_flow();

    let code = world.room().expect("room was created");
    let violations = check_store_state(world.store(), code);
    assert!(violations.is_empty(), "invariants violated: {violations:?}");

    let transcript = world.transcript().join("\n");
    insta::assert_snapshot!(transcript);
}

#[test]
fn scenario_is_reproducible() {
    let mut first = SimWorld::new(ScenarioConfig::default());
    let mut second = SimWorld::new(ScenarioConfig::default());
    first.run_single_use_invite_flow();
    second.run_single_use_invite_flow();

    assert_eq!(first.transcript(), second.transcript());
}

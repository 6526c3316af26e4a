//! Fuzz target for admission and lifecycle under arbitrary interleavings
//!
//! # Strategy
//!
//! - Small participant pool so re-entry, ownership races, and capacity
//!   pressure all occur
//! - Mixed operations: admission, heartbeats, detach, messages, lock
//!   toggles, permanent close, and time advances past the typing and
//!   presence windows
//!
//! # Invariants
//!
//! - The room document invariants hold after every operation
//! - At most one owner is ever assigned, and only to the first entrant
//! - The auto-lock fires at most once per room
//! - The allowed set never shrinks
//! - Accepted messages get strictly increasing ids
//! - No engine call panics, whatever the interleaving

#![no_main]

use std::collections::BTreeSet;

use alcove_core::{
    Admission, EntrantRole, ParticipantId, RetryPolicy, RoomConfig, Store, admission,
    lifecycle,
    message::{self, MessageBody},
    presence,
};
use alcove_harness::SimEnv;
use alcove_store::MemoryStore;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct AdmissionScenario {
    seed: u64,
    operations: Vec<RoomOperation>,
}

#[derive(Debug, Arbitrary)]
enum RoomOperation {
    Enter { participant: u8 },
    Heartbeat { participant: u8 },
    Leave { participant: u8 },
    SendText { participant: u8, filler: u8 },
    ToggleLock { participant: u8 },
    Close { participant: u8 },
    AdvanceTime { ms: u16 },
}

/// Twelve candidate identities against eight seats keeps rejections and
/// re-entries both reachable.
fn participant(index: u8) -> ParticipantId {
    ParticipantId(u128::from(index % 12) + 1)
}

fuzz_target!(|scenario: AdmissionScenario| {
    let env = SimEnv::new(scenario.seed);
    let store = MemoryStore::new(env.clone());
    let config = RoomConfig::default();
    let policy = RetryPolicy::default();

    let Ok(code) = lifecycle::create_room(&store, &env, &config) else {
        return;
    };

    let mut owners_assigned = 0usize;
    let mut auto_locks = 0usize;
    let mut last_message_id = 0u64;
    let mut seen_allowed: BTreeSet<ParticipantId> = BTreeSet::new();

    for op in scenario.operations {
        match op {
            RoomOperation::Enter { participant: index } => {
                let entrant = participant(index);
                match admission::enter(&store, &env, &config, &policy, code, entrant) {
                    Ok(Admission::Admitted(EntrantRole::Owner)) => {
                        owners_assigned += 1;
                        let _ = presence::heartbeat(&store, &env, code, entrant, None);
                    },
                    Ok(Admission::Admitted(EntrantRole::Guest { auto_locked })) => {
                        if auto_locked {
                            auto_locks += 1;
                        }
                        let _ = presence::heartbeat(&store, &env, code, entrant, None);
                    },
                    Ok(Admission::AlreadyMember) | Err(_) => {},
                }
            },
            RoomOperation::Heartbeat { participant: index } => {
                let _ = presence::heartbeat(&store, &env, code, participant(index), None);
            },
            RoomOperation::Leave { participant: index } => {
                let _ = presence::detach(&store, code, participant(index));
            },
            RoomOperation::SendText { participant: index, filler } => {
                let body = MessageBody::Text(format!("note {filler}"));
                if let Ok(stored) =
                    message::append(&store, &env, code, participant(index), body)
                {
                    assert!(
                        stored.id.0 > last_message_id,
                        "message id {} did not advance past {last_message_id}",
                        stored.id.0
                    );
                    last_message_id = stored.id.0;
                }
            },
            RoomOperation::ToggleLock { participant: index } => {
                let _ =
                    lifecycle::toggle_lock(&store, &env, &policy, code, participant(index));
            },
            RoomOperation::Close { participant: index } => {
                let _ =
                    lifecycle::close_forever(&store, &env, &policy, code, participant(index));
            },
            RoomOperation::AdvanceTime { ms } => {
                env.advance_ms(u64::from(ms));
            },
        }

        let versioned = store
            .room(code)
            .expect("store read")
            .expect("room still present");
        let doc = versioned.doc;
        assert!(doc.invariants_hold(), "document invariants broken: {doc:?}");
        assert!(owners_assigned <= 1, "ownership assigned twice");
        assert!(auto_locks <= 1, "auto-lock fired twice");
        assert!(
            doc.allowed.is_superset(&seen_allowed),
            "allowed set shrank from {seen_allowed:?} to {:?}",
            doc.allowed
        );
        seen_allowed = doc.allowed;
    }
});

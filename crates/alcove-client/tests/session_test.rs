//! Session behavior against a shared in-memory store.
//!
//! Each test stands up one store, one seeded environment, and however
//! many sessions the scenario needs, exactly as concurrent clients of
//! one shared document store would.

use std::time::Duration;

use alcove_client::{MemoryBlobStore, RoomSession, SessionError, SessionEvent};
use alcove_core::{
    Admission, EntrantRole, Environment, ParticipantId, RetryPolicy, RoomCode, RoomConfig,
    RoomError, Store, lifecycle,
    message::MessageBody,
};
use alcove_harness::SimEnv;
use alcove_store::{FlakyStore, MemoryStore};
use bytes::Bytes;

type MemorySession = RoomSession<MemoryStore<SimEnv>, SimEnv>;

fn setup() -> (MemoryStore<SimEnv>, SimEnv, RoomCode) {
    let env = SimEnv::new(21);
    let store = MemoryStore::new(env.clone());
    let code =
        lifecycle::create_room(&store, &env, &RoomConfig::default()).expect("room creation");
    (store, env, code)
}

async fn join(
    store: &MemoryStore<SimEnv>,
    env: &SimEnv,
    code: RoomCode,
    id: u128,
) -> Result<MemorySession, SessionError> {
    RoomSession::join(
        store.clone(),
        env.clone(),
        RoomConfig::default(),
        RetryPolicy::default(),
        code,
        ParticipantId(id),
        Some(format!("p{id}")),
    )
    .await
}

/// Drains session events until one matches, with a wall-clock bound.
async fn wait_for(
    session: &mut MemorySession,
    mut matching: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = session.next_event().await.expect("feeds ended");
            if matching(&event) {
                return event;
            }
        }
    })
    .await
    .expect("no matching event arrived")
}

#[tokio::test]
async fn first_entrant_owns_then_first_guest_auto_locks() {
    let (store, env, code) = setup();

    let owner = join(&store, &env, code, 1).await.expect("owner joins");
    assert_eq!(owner.admission(), Admission::Admitted(EntrantRole::Owner));

    let guest = join(&store, &env, code, 2).await.expect("guest joins");
    assert_eq!(
        guest.admission(),
        Admission::Admitted(EntrantRole::Guest { auto_locked: true })
    );

    match join(&store, &env, code, 3).await {
        Err(SessionError::Room(RoomError::Locked)) => {}
        other => panic!("expected Locked, got {:?}", other.map(|s| s.admission())),
    }
}

#[tokio::test]
async fn reopened_room_admits_without_relocking() {
    let (store, env, code) = setup();
    let owner = join(&store, &env, code, 1).await.expect("owner joins");
    let _guest = join(&store, &env, code, 2).await.expect("guest joins");

    assert!(!owner.toggle_lock().expect("owner reopens"));

    let second = join(&store, &env, code, 3).await.expect("second guest joins");
    assert_eq!(
        second.admission(),
        Admission::Admitted(EntrantRole::Guest { auto_locked: false })
    );
}

#[tokio::test]
async fn rejoin_after_leave_is_already_member_even_when_locked() {
    let (store, env, code) = setup();
    let _owner = join(&store, &env, code, 1).await.expect("owner joins");
    let guest = join(&store, &env, code, 2).await.expect("guest joins");

    guest.leave().expect("clean leave");
    assert_eq!(store.members(code).expect("roster").len(), 1, "seat released");

    // The room is locked (first guest fired auto-lock), but the allowed
    // set is authoritative: re-entry is recognized, not shut out.
    let again = join(&store, &env, code, 2).await.expect("re-entry");
    assert_eq!(again.admission(), Admission::AlreadyMember);
}

#[tokio::test]
async fn message_snapshots_flow_through_events() {
    let (store, env, code) = setup();
    let mut owner = join(&store, &env, code, 1).await.expect("owner joins");
    let mut guest = join(&store, &env, code, 2).await.expect("guest joins");

    let stored = owner.send_text("first post").expect("send");

    let event = wait_for(&mut guest, |event| {
        matches!(event, SessionEvent::Messages(history) if !history.is_empty())
    })
    .await;
    let SessionEvent::Messages(history) = event else { unreachable!() };
    assert_eq!(history[0].id, stored.id);
    assert_eq!(history[0].body, MessageBody::Text("first post".to_owned()));
}

#[tokio::test]
async fn visible_snapshot_marking_accumulates_receipts() {
    let (store, env, code) = setup();
    let mut owner = join(&store, &env, code, 1).await.expect("owner joins");
    let guest = join(&store, &env, code, 2).await.expect("guest joins");

    owner.send_text("read me").expect("send");
    let history = guest.history().expect("history");
    guest.mark_visible_read(&history).expect("mark read");
    // Marking the same snapshot again is idempotent.
    guest.mark_visible_read(&history).expect("mark read twice");

    let after = guest.history().expect("history");
    assert_eq!(after[0].read_by.len(), 1);
    assert!(after[0].read_by.contains(&ParticipantId(2)));
    assert!(!after[0].read_by.contains(&ParticipantId(1)), "sender never self-marks");
}

#[tokio::test]
async fn typing_shows_to_others_and_blocking_hides_it() {
    let (store, env, code) = setup();
    let mut owner = join(&store, &env, code, 1).await.expect("owner joins");
    let mut guest = join(&store, &env, code, 2).await.expect("guest joins");

    guest.keystroke().expect("keystroke");
    let event =
        wait_for(&mut owner, |event| matches!(event, SessionEvent::SomeoneTyping(_))).await;
    assert_eq!(event, SessionEvent::SomeoneTyping(true));

    owner.block(guest.participant()).expect("block");
    guest.keystroke().expect("keystroke");
    let event = wait_for(&mut owner, |event| {
        matches!(event, SessionEvent::SomeoneTyping(false))
    })
    .await;
    assert_eq!(event, SessionEvent::SomeoneTyping(false));
}

#[tokio::test]
async fn send_clears_own_typing_record() {
    let (store, env, code) = setup();
    let mut owner = join(&store, &env, code, 1).await.expect("owner joins");

    owner.keystroke().expect("keystroke");
    assert_eq!(typing_records(&store, code), 1);

    owner.send_text("done typing").expect("send");
    assert_eq!(typing_records(&store, code), 0);
}

#[tokio::test(start_paused = true)]
async fn typing_auto_clears_after_the_ttl() {
    let (store, env, code) = setup();
    let mut owner = join(&store, &env, code, 1).await.expect("owner joins");

    owner.keystroke().expect("keystroke");
    assert_eq!(typing_records(&store, code), 1);

    // The paused clock advances through the auto-clear timer.
    tokio::time::sleep(RoomConfig::default().typing_ttl + Duration::from_millis(50)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(typing_records(&store, code), 0);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_task_refreshes_the_member_record() {
    let (store, env, code) = setup();
    let config = RoomConfig::default();
    let _owner = join(&store, &env, code, 1).await.expect("owner joins");

    let before = store.members(code).expect("roster")[0].record.last_active_ms;

    env.advance_ms(config.heartbeat_interval.as_millis() as u64);
    tokio::time::sleep(config.heartbeat_interval + Duration::from_millis(100)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let after = store.members(code).expect("roster")[0].record.last_active_ms;
    assert_eq!(after, env.now_ms());
    assert!(after > before);
}

#[tokio::test(start_paused = true)]
async fn dropped_session_stops_heartbeating() {
    let (store, env, code) = setup();
    let config = RoomConfig::default();
    let owner = join(&store, &env, code, 1).await.expect("owner joins");
    let stamped = store.members(code).expect("roster")[0].record.last_active_ms;

    drop(owner);
    env.advance_ms(config.heartbeat_interval.as_millis() as u64);
    tokio::time::sleep(config.heartbeat_interval + Duration::from_millis(100)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    // No clean leave, so the record lingers, but it is never refreshed
    // and ages out of the freshness window on its own.
    let record = &store.members(code).expect("roster")[0].record;
    assert_eq!(record.last_active_ms, stamped);
}

#[tokio::test]
async fn voice_clip_is_uploaded_then_referenced() {
    let (store, env, code) = setup();
    let mut owner = join(&store, &env, code, 1).await.expect("owner joins");
    let blobs = MemoryBlobStore::new();

    let stored = owner
        .send_voice(&blobs, Bytes::from_static(b"opus frames"), 1_800)
        .await
        .expect("voice send");

    let MessageBody::Voice { media, duration_ms } = &stored.body else {
        panic!("expected a voice body, got {:?}", stored.body);
    };
    assert_eq!(*duration_ms, 1_800);

    use alcove_core::external::BlobStore as _;
    assert_eq!(blobs.get(media).await.expect("blob"), Bytes::from_static(b"opus frames"));
}

#[tokio::test]
async fn closed_room_refuses_writes_but_keeps_history_readable() {
    let (store, env, code) = setup();
    let owner = join(&store, &env, code, 1).await.expect("owner joins");
    let mut guest = join(&store, &env, code, 2).await.expect("guest joins");

    guest.send_text("before the end").expect("send");
    owner.close_forever().expect("owner closes");

    match guest.send_text("too late") {
        Err(SessionError::Room(RoomError::Closed)) => {}
        other => panic!("expected Closed, got {other:?}"),
    }
    assert_eq!(guest.history().expect("history").len(), 1);

    match join(&store, &env, code, 3).await {
        Err(SessionError::Room(RoomError::Closed)) => {}
        other => panic!("expected Closed, got {:?}", other.map(|s| s.admission())),
    }
}

#[tokio::test(start_paused = true)]
async fn unyielding_contention_exhausts_the_retry_budget() {
    let env = SimEnv::new(33);
    let inner = MemoryStore::new(env.clone());
    let code =
        lifecycle::create_room(&inner, &env, &RoomConfig::default()).expect("room creation");
    let store = FlakyStore::new(inner, 1.0);

    let policy = RetryPolicy::default();
    let result = RoomSession::join(
        store,
        env,
        RoomConfig::default(),
        policy,
        code,
        ParticipantId(1),
        None,
    )
    .await;

    match result {
        Err(SessionError::Room(RoomError::Contended { attempts })) => {
            assert_eq!(attempts, policy.max_attempts);
        }
        other => panic!("expected Contended, got {:?}", other.map(|s| s.admission())),
    }
}

fn typing_records(store: &MemoryStore<SimEnv>, code: RoomCode) -> usize {
    // The feed primes with the current snapshot, which is the cheapest
    // way to observe the typing collection from a test.
    store.watch_typing(code).latest().len()
}

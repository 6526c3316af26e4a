//! Contention-injecting store wrapper.
//!
//! Wraps a real store and makes a configurable fraction of conditional
//! room updates fail with a revision conflict, as if another writer got
//! there first. Used to exercise retry budgets and admission races
//! without needing real concurrency.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use alcove_core::{
    MessageId, ParticipantId, RoomCode,
    message::{MessageDraft, StoredMessage},
    presence::{Member, MemberRecord},
    room::RoomDoc,
    store::{Feed, Store, StoreError, VersionedRoom},
    typing::TypingRecord,
};

/// Store wrapper that injects revision conflicts.
///
/// Delegates every operation to the inner store; `update_room` fails
/// with [`StoreError::Conflict`] at the configured rate before the
/// inner store is consulted, so an injected conflict never commits.
/// Uses Arc<Mutex<>> for the RNG state, making it Clone and
/// thread-safe.
#[derive(Clone)]
pub struct FlakyStore<S: Store> {
    inner: S,
    /// Conflict rate (0.0 = never conflict, 1.0 = always conflict)
    conflict_rate: f64,
    /// RNG state for deterministic injection
    rng: Arc<Mutex<FlakyRng>>,
    /// Operation counter for performance oracles
    operation_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for conflict injection
///
/// Uses a linear congruential generator (LCG) for fast, deterministic
/// randomness, so runs are reproducible with the same seed.
struct FlakyRng {
    state: u64,
}

impl FlakyRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_conflict(&mut self, conflict_rate: f64) -> bool {
        self.next() < conflict_rate
    }
}

impl<S: Store> FlakyStore<S> {
    /// Create a new conflict-injecting wrapper.
    ///
    /// # Panics
    ///
    /// Panics if `conflict_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, conflict_rate: f64) -> Self {
        Self::with_seed(inner, conflict_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible runs.
    ///
    /// # Panics
    ///
    /// Panics if `conflict_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, conflict_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&conflict_rate),
            "conflict_rate must be between 0.0 and 1.0, got {conflict_rate}"
        );

        Self {
            inner,
            conflict_rate,
            rng: Arc::new(Mutex::new(FlakyRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying store (for checking invariants after injection).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of store operations attempted, injected failures
    /// included.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    fn count_operation(&self) {
        #[allow(clippy::expect_used)]
        let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
        *count += 1;
    }

    fn should_conflict(&self) -> bool {
        #[allow(clippy::expect_used)]
        self.rng.lock().expect("FlakyRng mutex poisoned").should_conflict(self.conflict_rate)
    }
}

impl<S: Store> Store for FlakyStore<S> {
    fn create_room(&self, code: RoomCode, doc: &RoomDoc) -> Result<u64, StoreError> {
        self.count_operation();
        self.inner.create_room(code, doc)
    }

    fn room(&self, code: RoomCode) -> Result<Option<VersionedRoom>, StoreError> {
        self.count_operation();
        self.inner.room(code)
    }

    fn update_room(
        &self,
        code: RoomCode,
        expected: u64,
        doc: &RoomDoc,
    ) -> Result<u64, StoreError> {
        self.count_operation();
        if self.should_conflict() {
            // Pretend another writer advanced the revision under us.
            return Err(StoreError::Conflict {
                expected: expected + 1,
                got: expected,
            });
        }
        self.inner.update_room(code, expected, doc)
    }

    fn put_member(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        record: &MemberRecord,
    ) -> Result<(), StoreError> {
        self.count_operation();
        self.inner.put_member(code, participant, record)
    }

    fn remove_member(
        &self,
        code: RoomCode,
        participant: ParticipantId,
    ) -> Result<(), StoreError> {
        self.count_operation();
        self.inner.remove_member(code, participant)
    }

    fn members(&self, code: RoomCode) -> Result<Vec<Member>, StoreError> {
        self.count_operation();
        self.inner.members(code)
    }

    fn append_message(
        &self,
        code: RoomCode,
        draft: &MessageDraft,
    ) -> Result<StoredMessage, StoreError> {
        self.count_operation();
        self.inner.append_message(code, draft)
    }

    fn message(
        &self,
        code: RoomCode,
        id: MessageId,
    ) -> Result<Option<StoredMessage>, StoreError> {
        self.count_operation();
        self.inner.message(code, id)
    }

    fn messages(&self, code: RoomCode) -> Result<Vec<StoredMessage>, StoreError> {
        self.count_operation();
        self.inner.messages(code)
    }

    fn tombstone_message(&self, code: RoomCode, id: MessageId) -> Result<(), StoreError> {
        self.count_operation();
        self.inner.tombstone_message(code, id)
    }

    fn mark_read(
        &self,
        code: RoomCode,
        id: MessageId,
        reader: ParticipantId,
    ) -> Result<(), StoreError> {
        self.count_operation();
        self.inner.mark_read(code, id, reader)
    }

    fn set_typing(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        since_ms: u64,
    ) -> Result<(), StoreError> {
        self.count_operation();
        self.inner.set_typing(code, participant, since_ms)
    }

    fn clear_typing(
        &self,
        code: RoomCode,
        participant: ParticipantId,
    ) -> Result<(), StoreError> {
        self.count_operation();
        self.inner.clear_typing(code, participant)
    }

    fn blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
    ) -> Result<BTreeSet<ParticipantId>, StoreError> {
        self.count_operation();
        self.inner.blocked(code, owner)
    }

    fn put_blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
        set: &BTreeSet<ParticipantId>,
    ) -> Result<(), StoreError> {
        self.count_operation();
        self.inner.put_blocked(code, owner, set)
    }

    fn watch_room(&self, code: RoomCode) -> Feed<Option<VersionedRoom>> {
        self.inner.watch_room(code)
    }

    fn watch_messages(&self, code: RoomCode) -> Feed<Vec<StoredMessage>> {
        self.inner.watch_messages(code)
    }

    fn watch_typing(&self, code: RoomCode) -> Feed<Vec<TypingRecord>> {
        self.inner.watch_typing(code)
    }

    fn watch_presence(&self, code: RoomCode) -> Feed<Vec<Member>> {
        self.inner.watch_presence(code)
    }

    fn list_rooms(&self) -> Result<Vec<RoomCode>, StoreError> {
        self.count_operation();
        self.inner.list_rooms()
    }

    fn purge_expired(&self, now_ms: u64) -> Result<Vec<RoomCode>, StoreError> {
        self.count_operation();
        self.inner.purge_expired(now_ms)
    }
}

//! Document store abstraction.
//!
//! The shared store is the only persistence and the only coordination channel
//! between clients. The trait is synchronous (no async) to keep engine logic
//! Sans-IO; the asynchronous face is the set of change [`Feed`]s, which are
//! plain `watch` channels and need no runtime to publish into.
//!
//! Logical layout:
//!
//! ```text
//! rooms/{code}                      room document + revision (CAS unit)
//! rooms/{code}/members/{participant} presence record
//! rooms/{code}/messages/{id}         message record
//! rooms/{code}/typing/{participant}  typing record
//! rooms/{code}/blocked/{participant} block list
//! ```

mod error;
mod feed;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use self::{
    error::StoreError,
    feed::{Feed, FeedPublisher},
};
use crate::{
    ident::{MessageId, ParticipantId, RoomCode},
    message::{MessageDraft, StoredMessage},
    presence::{Member, MemberRecord},
    room::RoomDoc,
    typing::TypingRecord,
};

/// A room document together with its store revision.
///
/// The revision increments on every room-document write and is the token for
/// conditional updates via [`Store::update_room`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRoom {
    /// Revision of this snapshot.
    pub revision: u64,
    /// The document itself.
    pub doc: RoomDoc,
}

/// Document store contract.
///
/// Must be Clone (shared by engines and feeds), Send + Sync, and synchronous.
/// Implementations typically share internal state via Arc, so clones access
/// the same underlying store.
///
/// # Atomicity
///
/// Each method is individually atomic. Cross-document invariants (admission,
/// lifecycle) are built from `room` + `update_room` CAS loops by the engines.
///
/// # Ordering
///
/// `messages` and message feed snapshots are ascending by
/// `(created_at_ms, id)`; both fields are assigned by the store at append
/// time, never taken from the client.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock).
pub trait Store: Clone + Send + Sync + 'static {
    /// Create a room document under a fresh code.
    ///
    /// Unlike most writes this is *not* idempotent: a code collision returns
    /// [`StoreError::AlreadyExists`] so the caller can regenerate the code.
    /// Returns the initial revision.
    fn create_room(&self, code: RoomCode, doc: &RoomDoc) -> Result<u64, StoreError>;

    /// Read a room document with its revision. `None` if absent.
    fn room(&self, code: RoomCode) -> Result<Option<VersionedRoom>, StoreError>;

    /// Conditionally replace a room document.
    ///
    /// Succeeds only if the stored revision still equals `expected`; returns
    /// the new revision. On a lost race returns [`StoreError::Conflict`].
    fn update_room(&self, code: RoomCode, expected: u64, doc: &RoomDoc)
    -> Result<u64, StoreError>;

    /// Upsert a presence record (heartbeat). The write is last-wins; no CAS.
    fn put_member(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        record: &MemberRecord,
    ) -> Result<(), StoreError>;

    /// Delete a presence record on detach. Removing an absent record is a
    /// no-op success.
    fn remove_member(&self, code: RoomCode, participant: ParticipantId)
    -> Result<(), StoreError>;

    /// All presence records for a room, in unspecified order.
    fn members(&self, code: RoomCode) -> Result<Vec<Member>, StoreError>;

    /// Append a message, assigning `id` and `created_at_ms` store-side.
    ///
    /// `created_at_ms` is monotonic within the room; `id` is the per-room
    /// sequence and breaks timestamp ties.
    fn append_message(
        &self,
        code: RoomCode,
        draft: &MessageDraft,
    ) -> Result<StoredMessage, StoreError>;

    /// Read one message. `None` if the id was never assigned.
    fn message(&self, code: RoomCode, id: MessageId)
    -> Result<Option<StoredMessage>, StoreError>;

    /// Full ordered message history, tombstones included.
    fn messages(&self, code: RoomCode) -> Result<Vec<StoredMessage>, StoreError>;

    /// Redact a message in place: body replaced, `deleted` set, position and
    /// `read_by` kept. Idempotent on an already-redacted message.
    ///
    /// Authorization (sender-only) is the engine's responsibility; see
    /// [`message::tombstone`](crate::message::tombstone).
    fn tombstone_message(&self, code: RoomCode, id: MessageId) -> Result<(), StoreError>;

    /// Add `reader` to a message's `read_by` set (idempotent union).
    ///
    /// On a tombstoned message this is a silent no-op: `read_by` freezes at
    /// deletion time.
    fn mark_read(
        &self,
        code: RoomCode,
        id: MessageId,
        reader: ParticipantId,
    ) -> Result<(), StoreError>;

    /// Upsert a typing record with its start time.
    fn set_typing(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        since_ms: u64,
    ) -> Result<(), StoreError>;

    /// Delete a typing record. Absent record is a no-op success.
    fn clear_typing(&self, code: RoomCode, participant: ParticipantId)
    -> Result<(), StoreError>;

    /// The block list `owner` keeps for this room.
    fn blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
    ) -> Result<BTreeSet<ParticipantId>, StoreError>;

    /// Replace `owner`'s block list for this room.
    fn put_blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
        set: &BTreeSet<ParticipantId>,
    ) -> Result<(), StoreError>;

    /// Change feed over the room document. Emits `None` while the room does
    /// not exist (subscribing before creation is allowed).
    fn watch_room(&self, code: RoomCode) -> Feed<Option<VersionedRoom>>;

    /// Change feed over the full ordered message history.
    fn watch_messages(&self, code: RoomCode) -> Feed<Vec<StoredMessage>>;

    /// Change feed over the room's typing records.
    fn watch_typing(&self, code: RoomCode) -> Feed<Vec<TypingRecord>>;

    /// Change feed over the room's presence records.
    fn watch_presence(&self, code: RoomCode) -> Feed<Vec<Member>>;

    /// All room codes, order unspecified. Used by sweepers and tooling.
    fn list_rooms(&self) -> Result<Vec<RoomCode>, StoreError>;

    /// Drop every room whose `expires_at_ms` is in the past, with all of its
    /// subcollections. Returns the purged codes. Correctness never depends on
    /// this (expiry is enforced on the write paths), but embedders may want
    /// the space back.
    fn purge_expired(&self, now_ms: u64) -> Result<Vec<RoomCode>, StoreError>;
}

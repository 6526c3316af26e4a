#![allow(
    clippy::disallowed_types,
    reason = "Bus mutex is held only for short synchronous sections"
)]

//! Redb-backed durable store implementation.
//!
//! Uses redb's ACID transactions for crash safety; all room state
//! survives restarts. Change feeds are in-process only: subscribers see
//! mutations made through this instance, which is the same scope the
//! in-memory store offers.

use std::{
    collections::BTreeSet,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use alcove_core::{
    Environment, MessageId, ParticipantId, RoomCode,
    message::{self, MessageBody, MessageDraft, StoredMessage},
    presence::{Member, MemberRecord},
    room::RoomDoc,
    store::{Feed, Store, StoreError, VersionedRoom},
    typing::TypingRecord,
};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::bus::Bus;

/// Table: rooms
/// Key: room code bytes [6 bytes]
/// Value: CBOR-encoded `VersionedRoom` (revision + document)
const ROOMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("rooms");

/// Table: members
/// Key: (room code, participant id) as [6 + 16 bytes BE]
/// Value: CBOR-encoded `MemberRecord`
const MEMBERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("members");

/// Table: messages
/// Key: (room code, message id) as [6 + 8 bytes BE]
/// Value: CBOR-encoded `StoredMessage`
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");

/// Table: typing
/// Key: (room code, participant id) as [6 + 16 bytes BE]
/// Value: `since_ms` as 8 bytes BE
const TYPING: TableDefinition<&[u8], &[u8]> = TableDefinition::new("typing");

/// Table: blocked
/// Key: (room code, owner participant id) as [6 + 16 bytes BE]
/// Value: CBOR-encoded `BTreeSet<ParticipantId>`
const BLOCKED: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocked");

/// Durable store backed by redb.
///
/// Thread-safe through redb's internal locking; Clone is cheap (Arc).
/// Message ids and timestamps are assigned inside the write transaction,
/// so they stay sequential under concurrent appends.
#[derive(Clone)]
pub struct RedbStore<E> {
    db: Arc<Database>,
    env: E,
    bus: Arc<Mutex<Bus>>,
}

impl<E: Environment> RedbStore<E> {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates all tables up front so later read transactions never see
    /// a missing table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the database cannot be opened or
    /// created.
    pub fn open(path: impl AsRef<Path>, env: E) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(MEMBERS).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(MESSAGES).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(TYPING).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(BLOCKED).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            env,
            bus: Arc::new(Mutex::new(Bus::new())),
        })
    }

    #[allow(clippy::expect_used)]
    fn bus(&self) -> MutexGuard<'_, Bus> {
        self.bus.lock().expect("Mutex poisoned")
    }

    /// Publishes the room document as currently committed.
    ///
    /// The snapshot is read while holding the bus lock, so later
    /// publishes never carry an older committed state.
    fn publish_room_snapshot(&self, code: RoomCode) {
        let bus = self.bus();
        match self.room(code) {
            Ok(value) => bus.publish_room(code, value),
            Err(err) => warn!(room = %code, error = %err, "room feed snapshot failed"),
        }
    }

    fn publish_message_snapshot(&self, code: RoomCode) {
        let bus = self.bus();
        match self.messages(code) {
            Ok(value) => bus.publish_messages(code, value),
            Err(err) => warn!(room = %code, error = %err, "message feed snapshot failed"),
        }
    }

    fn publish_typing_snapshot(&self, code: RoomCode) {
        let bus = self.bus();
        match self.typing_records(code) {
            Ok(value) => bus.publish_typing(code, value),
            Err(err) => warn!(room = %code, error = %err, "typing feed snapshot failed"),
        }
    }

    fn publish_presence_snapshot(&self, code: RoomCode) {
        let bus = self.bus();
        match self.members(code) {
            Ok(value) => bus.publish_presence(code, value),
            Err(err) => warn!(room = %code, error = %err, "presence feed snapshot failed"),
        }
    }

    /// All typing records for a room, from a fresh read transaction.
    fn typing_records(&self, code: RoomCode) -> Result<Vec<TypingRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(TYPING).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut records = Vec::new();
        for entry in scan_room(&table, code)? {
            let (key, value) = entry;
            let participant = participant_from_key(&key)?;
            let bytes: [u8; 8] = value.as_slice().try_into().map_err(|_| {
                StoreError::Serialization("typing value must be 8 bytes".to_string())
            })?;
            records.push(TypingRecord {
                participant,
                since_ms: u64::from_be_bytes(bytes),
            });
        }
        Ok(records)
    }
}

impl<E: Environment> Store for RedbStore<E> {
    fn create_room(&self, code: RoomCode, doc: &RoomDoc) -> Result<u64, StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;

            let key = room_key(code);
            if table
                .get(key.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
                .is_some()
            {
                return Err(StoreError::AlreadyExists(code));
            }

            let versioned = VersionedRoom {
                revision: 1,
                doc: doc.clone(),
            };
            let bytes = encode(&versioned)?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        self.publish_room_snapshot(code);
        Ok(1)
    }

    fn room(&self, code: RoomCode) -> Result<Option<VersionedRoom>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;
        read_room(&table, code)
    }

    fn update_room(
        &self,
        code: RoomCode,
        expected: u64,
        doc: &RoomDoc,
    ) -> Result<u64, StoreError> {
        let revision;
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;

            let current = read_room(&table, code)?.ok_or(StoreError::RoomNotFound(code))?;
            if current.revision != expected {
                return Err(StoreError::Conflict {
                    expected: current.revision,
                    got: expected,
                });
            }

            revision = expected + 1;
            let versioned = VersionedRoom {
                revision,
                doc: doc.clone(),
            };
            let bytes = encode(&versioned)?;
            let key = room_key(code);
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        self.publish_room_snapshot(code);
        Ok(revision)
    }

    fn put_member(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        record: &MemberRecord,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let rooms = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;
            require_room(&rooms, code)?;

            let mut table =
                txn.open_table(MEMBERS).map_err(|e| StoreError::Io(e.to_string()))?;
            let key = participant_key(code, participant);
            let bytes = encode(record)?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        self.publish_presence_snapshot(code);
        Ok(())
    }

    fn remove_member(
        &self,
        code: RoomCode,
        participant: ParticipantId,
    ) -> Result<(), StoreError> {
        let removed;
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(MEMBERS).map_err(|e| StoreError::Io(e.to_string()))?;
            let key = participant_key(code, participant);
            removed = table
                .remove(key.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
                .is_some();
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        if removed {
            self.publish_presence_snapshot(code);
        }
        Ok(())
    }

    fn members(&self, code: RoomCode) -> Result<Vec<Member>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(MEMBERS).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut members = Vec::new();
        for (key, value) in scan_room(&table, code)? {
            members.push(Member {
                participant: participant_from_key(&key)?,
                record: decode(&value)?,
            });
        }
        Ok(members)
    }

    fn append_message(
        &self,
        code: RoomCode,
        draft: &MessageDraft,
    ) -> Result<StoredMessage, StoreError> {
        let now_ms = self.env.now_ms();
        let stored;
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let rooms = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;
            require_room(&rooms, code)?;

            let mut table =
                txn.open_table(MESSAGES).map_err(|e| StoreError::Io(e.to_string()))?;

            // The previous message fixes both the next id and the
            // monotone timestamp floor.
            let (next_id, floor_ms) = match last_message(&table, code)? {
                Some(last) => (last.id.0 + 1, last.created_at_ms),
                None => (1, 0),
            };

            stored = StoredMessage {
                id: MessageId(next_id),
                sender: draft.sender,
                body: draft.body.clone(),
                created_at_ms: now_ms.max(floor_ms),
                read_by: BTreeSet::new(),
                deleted: false,
            };

            let key = message_key(code, stored.id);
            let bytes = encode(&stored)?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        self.publish_message_snapshot(code);
        Ok(stored)
    }

    fn message(
        &self,
        code: RoomCode,
        id: MessageId,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(MESSAGES).map_err(|e| StoreError::Io(e.to_string()))?;

        let key = message_key(code, id);
        match table.get(key.as_slice()).map_err(|e| StoreError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn messages(&self, code: RoomCode) -> Result<Vec<StoredMessage>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(MESSAGES).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut messages = Vec::new();
        for (_, value) in scan_room(&table, code)? {
            messages.push(decode(&value)?);
        }
        message::stream_order(&mut messages);
        Ok(messages)
    }

    fn tombstone_message(&self, code: RoomCode, id: MessageId) -> Result<(), StoreError> {
        let changed;
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(MESSAGES).map_err(|e| StoreError::Io(e.to_string()))?;

            let key = message_key(code, id);
            let mut stored: StoredMessage = match table
                .get(key.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
            {
                Some(value) => decode(value.value())?,
                None => return Err(StoreError::MessageNotFound(id)),
            };

            changed = !stored.deleted;
            if changed {
                stored.body = MessageBody::Redacted;
                stored.deleted = true;
                let bytes = encode(&stored)?;
                table
                    .insert(key.as_slice(), bytes.as_slice())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        if changed {
            self.publish_message_snapshot(code);
        }
        Ok(())
    }

    fn mark_read(
        &self,
        code: RoomCode,
        id: MessageId,
        reader: ParticipantId,
    ) -> Result<(), StoreError> {
        let changed;
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(MESSAGES).map_err(|e| StoreError::Io(e.to_string()))?;

            let key = message_key(code, id);
            let mut stored: StoredMessage = match table
                .get(key.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
            {
                Some(value) => decode(value.value())?,
                None => return Err(StoreError::MessageNotFound(id)),
            };

            changed = !stored.deleted && stored.read_by.insert(reader);
            if changed {
                let bytes = encode(&stored)?;
                table
                    .insert(key.as_slice(), bytes.as_slice())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        if changed {
            self.publish_message_snapshot(code);
        }
        Ok(())
    }

    fn set_typing(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        since_ms: u64,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let rooms = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;
            require_room(&rooms, code)?;

            let mut table =
                txn.open_table(TYPING).map_err(|e| StoreError::Io(e.to_string()))?;
            let key = participant_key(code, participant);
            table
                .insert(key.as_slice(), since_ms.to_be_bytes().as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        self.publish_typing_snapshot(code);
        Ok(())
    }

    fn clear_typing(
        &self,
        code: RoomCode,
        participant: ParticipantId,
    ) -> Result<(), StoreError> {
        let removed;
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(TYPING).map_err(|e| StoreError::Io(e.to_string()))?;
            let key = participant_key(code, participant);
            removed = table
                .remove(key.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
                .is_some();
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        if removed {
            self.publish_typing_snapshot(code);
        }
        Ok(())
    }

    fn blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
    ) -> Result<BTreeSet<ParticipantId>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(BLOCKED).map_err(|e| StoreError::Io(e.to_string()))?;

        let key = participant_key(code, owner);
        match table.get(key.as_slice()).map_err(|e| StoreError::Io(e.to_string()))? {
            Some(value) => decode(value.value()),
            None => Ok(BTreeSet::new()),
        }
    }

    fn put_blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
        set: &BTreeSet<ParticipantId>,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let rooms = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;
            require_room(&rooms, code)?;

            let mut table =
                txn.open_table(BLOCKED).map_err(|e| StoreError::Io(e.to_string()))?;
            let key = participant_key(code, owner);
            let bytes = encode(set)?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn watch_room(&self, code: RoomCode) -> Feed<Option<VersionedRoom>> {
        let mut bus = self.bus();
        bus.watch_room(code, || {
            self.room(code).unwrap_or_else(|err| {
                warn!(room = %code, error = %err, "room feed primed empty");
                None
            })
        })
    }

    fn watch_messages(&self, code: RoomCode) -> Feed<Vec<StoredMessage>> {
        let mut bus = self.bus();
        bus.watch_messages(code, || {
            self.messages(code).unwrap_or_else(|err| {
                warn!(room = %code, error = %err, "message feed primed empty");
                Vec::new()
            })
        })
    }

    fn watch_typing(&self, code: RoomCode) -> Feed<Vec<TypingRecord>> {
        let mut bus = self.bus();
        bus.watch_typing(code, || {
            self.typing_records(code).unwrap_or_else(|err| {
                warn!(room = %code, error = %err, "typing feed primed empty");
                Vec::new()
            })
        })
    }

    fn watch_presence(&self, code: RoomCode) -> Feed<Vec<Member>> {
        let mut bus = self.bus();
        bus.watch_presence(code, || {
            self.members(code).unwrap_or_else(|err| {
                warn!(room = %code, error = %err, "presence feed primed empty");
                Vec::new()
            })
        })
    }

    fn list_rooms(&self) -> Result<Vec<RoomCode>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut rooms = Vec::new();
        for result in table.iter().map_err(|e| StoreError::Io(e.to_string()))? {
            let (key, _) = result.map_err(|e| StoreError::Io(e.to_string()))?;
            rooms.push(code_from_key(key.value())?);
        }
        Ok(rooms)
    }

    fn purge_expired(&self, now_ms: u64) -> Result<Vec<RoomCode>, StoreError> {
        let mut expired = Vec::new();
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut rooms = txn.open_table(ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;

            for result in rooms.iter().map_err(|e| StoreError::Io(e.to_string()))? {
                let (key, value) = result.map_err(|e| StoreError::Io(e.to_string()))?;
                let versioned: VersionedRoom = decode(value.value())?;
                if versioned.doc.is_expired(now_ms) {
                    expired.push(code_from_key(key.value())?);
                }
            }

            for &code in &expired {
                let key = room_key(code);
                rooms
                    .remove(key.as_slice())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }

            let mut members =
                txn.open_table(MEMBERS).map_err(|e| StoreError::Io(e.to_string()))?;
            let mut messages =
                txn.open_table(MESSAGES).map_err(|e| StoreError::Io(e.to_string()))?;
            let mut typing =
                txn.open_table(TYPING).map_err(|e| StoreError::Io(e.to_string()))?;
            let mut blocked =
                txn.open_table(BLOCKED).map_err(|e| StoreError::Io(e.to_string()))?;
            for &code in &expired {
                remove_room_range(&mut members, code)?;
                remove_room_range(&mut messages, code)?;
                remove_room_range(&mut typing, code)?;
                remove_room_range(&mut blocked, code)?;
            }
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        let mut bus = self.bus();
        for &code in &expired {
            bus.close_room(code);
        }
        Ok(expired)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Encode a room code as its 6-byte key.
fn room_key(code: RoomCode) -> [u8; RoomCode::LEN] {
    *code.as_bytes()
}

/// Encode (room code, participant) as a 22-byte big-endian key.
fn participant_key(code: RoomCode, participant: ParticipantId) -> [u8; RoomCode::LEN + 16] {
    let mut key = [0u8; RoomCode::LEN + 16];
    key[..RoomCode::LEN].copy_from_slice(code.as_bytes());
    key[RoomCode::LEN..].copy_from_slice(&participant.0.to_be_bytes());
    key
}

/// Encode (room code, message id) as a 14-byte big-endian key.
///
/// Big-endian id keeps lexicographic key order equal to numeric id
/// order within a room.
fn message_key(code: RoomCode, id: MessageId) -> [u8; RoomCode::LEN + 8] {
    let mut key = [0u8; RoomCode::LEN + 8];
    key[..RoomCode::LEN].copy_from_slice(code.as_bytes());
    key[RoomCode::LEN..].copy_from_slice(&id.0.to_be_bytes());
    key
}

fn code_from_key(key: &[u8]) -> Result<RoomCode, StoreError> {
    let text = std::str::from_utf8(key.get(..RoomCode::LEN).unwrap_or_default())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    text.parse()
        .map_err(|e: alcove_core::ident::RoomCodeError| StoreError::Serialization(e.to_string()))
}

fn participant_from_key(key: &[u8]) -> Result<ParticipantId, StoreError> {
    let bytes: [u8; 16] = key
        .get(RoomCode::LEN..)
        .unwrap_or_default()
        .try_into()
        .map_err(|_| StoreError::Serialization("participant key must be 22 bytes".to_string()))?;
    Ok(ParticipantId(u128::from_be_bytes(bytes)))
}

/// Inclusive key range covering every subcollection entry of a room.
///
/// Suffixes are at most 16 bytes, so a 16-byte `0xFF` upper bound caps
/// both participant and message keys.
fn room_range(code: RoomCode) -> (Vec<u8>, Vec<u8>) {
    let start = code.as_bytes().to_vec();
    let mut end = code.as_bytes().to_vec();
    end.extend_from_slice(&[0xFF; 16]);
    (start, end)
}

/// Collects all `(key, value)` pairs whose key starts with the room code.
fn scan_room<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    code: RoomCode,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
    let (start, end) = room_range(code);

    let mut entries = Vec::new();
    for result in table
        .range(start.as_slice()..=end.as_slice())
        .map_err(|e| StoreError::Io(e.to_string()))?
    {
        let (key, value) = result.map_err(|e| StoreError::Io(e.to_string()))?;
        if !key.value().starts_with(code.as_bytes()) {
            break;
        }
        entries.push((key.value().to_vec(), value.value().to_vec()));
    }
    Ok(entries)
}

/// The room's newest message, which carries the id and timestamp floor
/// for the next append.
fn last_message<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    code: RoomCode,
) -> Result<Option<StoredMessage>, StoreError> {
    let start = message_key(code, MessageId(0));
    let end = message_key(code, MessageId(u64::MAX));

    let mut range = table
        .range(start.as_slice()..=end.as_slice())
        .map_err(|e| StoreError::Io(e.to_string()))?;

    match range.next_back() {
        Some(result) => {
            let (_, value) = result.map_err(|e| StoreError::Io(e.to_string()))?;
            Ok(Some(decode(value.value())?))
        }
        None => Ok(None),
    }
}

fn read_room<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    code: RoomCode,
) -> Result<Option<VersionedRoom>, StoreError> {
    let key = room_key(code);
    match table.get(key.as_slice()).map_err(|e| StoreError::Io(e.to_string()))? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

fn require_room<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    code: RoomCode,
) -> Result<(), StoreError> {
    if read_room(table, code)?.is_none() {
        return Err(StoreError::RoomNotFound(code));
    }
    Ok(())
}

fn remove_room_range(
    table: &mut redb::Table<'_, &'static [u8], &'static [u8]>,
    code: RoomCode,
) -> Result<(), StoreError> {
    let (start, end) = room_range(code);

    let mut keys = Vec::new();
    for result in table
        .range(start.as_slice()..=end.as_slice())
        .map_err(|e| StoreError::Io(e.to_string()))?
    {
        let (key, _) = result.map_err(|e| StoreError::Io(e.to_string()))?;
        if !key.value().starts_with(code.as_bytes()) {
            break;
        }
        keys.push(key.value().to_vec());
    }
    for key in keys {
        table
            .remove(key.as_slice())
            .map_err(|e| StoreError::Io(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alcove_harness::SimEnv;
    use tempfile::tempdir;

    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> (RedbStore<SimEnv>, SimEnv) {
        let env = SimEnv::new(11);
        let store = RedbStore::open(dir.path().join("alcove.redb"), env.clone()).unwrap();
        (store, env)
    }

    fn draft(sender: u128, text: &str) -> MessageDraft {
        MessageDraft {
            sender: ParticipantId(sender),
            body: MessageBody::Text(text.to_owned()),
        }
    }

    #[test]
    fn test_participant_key_roundtrip() {
        let env = SimEnv::new(1);
        let code = RoomCode::generate(&env);
        let participant = ParticipantId(0x1234_5678_9abc_def0_fedc_ba98_7654_3210);

        let key = participant_key(code, participant);
        assert_eq!(key.len(), 22);
        assert_eq!(code_from_key(&key).unwrap(), code);
        assert_eq!(participant_from_key(&key).unwrap(), participant);
    }

    #[test]
    fn test_message_key_orders_by_id() {
        let env = SimEnv::new(2);
        let code = RoomCode::generate(&env);
        let low = message_key(code, MessageId(2));
        let high = message_key(code, MessageId(10));
        assert!(low < high);
    }

    #[test]
    fn test_room_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let env = SimEnv::new(3);
        let code = RoomCode::generate(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(3_600));

        {
            let store = RedbStore::open(dir.path().join("alcove.redb"), env.clone()).unwrap();
            store.create_room(code, &doc).unwrap();
            store.append_message(code, &draft(1, "durable")).unwrap();
        }

        let store = RedbStore::open(dir.path().join("alcove.redb"), env.clone()).unwrap();
        let versioned = store.room(code).unwrap().unwrap();
        assert_eq!(versioned.revision, 1);
        assert_eq!(versioned.doc, doc);

        let history = store.messages(code).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, MessageId(1));
    }

    #[test]
    fn test_update_room_detects_stale_revision() {
        let dir = tempdir().unwrap();
        let (store, env) = open_store(&dir);
        let code = RoomCode::generate(&env);
        let mut doc = RoomDoc::new(env.now_ms(), Duration::from_secs(3_600));
        store.create_room(code, &doc).unwrap();

        doc.locked = true;
        assert_eq!(store.update_room(code, 1, &doc).unwrap(), 2);

        match store.update_room(code, 1, &doc) {
            Err(StoreError::Conflict { expected: 2, got: 1 }) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_append_continues_sequence_across_reopen() {
        let dir = tempdir().unwrap();
        let env = SimEnv::new(5);
        let code = RoomCode::generate(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(3_600));

        {
            let store = RedbStore::open(dir.path().join("alcove.redb"), env.clone()).unwrap();
            store.create_room(code, &doc).unwrap();
            store.append_message(code, &draft(1, "one")).unwrap();
            store.append_message(code, &draft(1, "two")).unwrap();
        }

        let store = RedbStore::open(dir.path().join("alcove.redb"), env.clone()).unwrap();
        let third = store.append_message(code, &draft(2, "three")).unwrap();
        assert_eq!(third.id, MessageId(3));
    }

    #[test]
    fn test_purge_drops_room_and_subcollections() {
        let dir = tempdir().unwrap();
        let (store, env) = open_store(&dir);
        let code = RoomCode::generate(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(60));
        store.create_room(code, &doc).unwrap();
        store.append_message(code, &draft(1, "fading")).unwrap();
        store.set_typing(code, ParticipantId(1), env.now_ms()).unwrap();

        env.advance_ms(61_000);
        assert_eq!(store.purge_expired(env.now_ms()).unwrap(), vec![code]);

        assert!(store.room(code).unwrap().is_none());
        assert!(store.messages(code).unwrap().is_empty());
        assert!(store.members(code).unwrap().is_empty());
        assert!(store.list_rooms().unwrap().is_empty());
    }

    #[test]
    fn test_typing_value_roundtrip() {
        let dir = tempdir().unwrap();
        let (store, env) = open_store(&dir);
        let code = RoomCode::generate(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(3_600));
        store.create_room(code, &doc).unwrap();

        store.set_typing(code, ParticipantId(9), 12_345).unwrap();
        let records = store.typing_records(code).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].participant, ParticipantId(9));
        assert_eq!(records[0].since_ms, 12_345);

        store.clear_typing(code, ParticipantId(9)).unwrap();
        assert!(store.typing_records(code).unwrap().is_empty());
    }
}

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
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

use crate::bus::Bus;

/// In-memory store implementation for testing and simulation.
///
/// All state lives behind one `Arc<Mutex<_>>`, so clones observe the same
/// rooms and serve the same change feeds. Locking uses `lock().expect()`,
/// which panics if the mutex is poisoned (a thread panicked while holding
/// the lock) - acceptable for test and simulation code. The store assigns
/// message ids and timestamps from the [`Environment`] it was built with.
#[derive(Clone)]
pub struct MemoryStore<E> {
    env: E,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    rooms: HashMap<RoomCode, RoomSlot>,
    bus: Bus,
}

struct RoomSlot {
    revision: u64,
    doc: RoomDoc,
    members: HashMap<ParticipantId, MemberRecord>,
    messages: BTreeMap<MessageId, StoredMessage>,
    next_message_id: u64,
    last_created_at_ms: u64,
    typing: HashMap<ParticipantId, u64>,
    blocked: HashMap<ParticipantId, BTreeSet<ParticipantId>>,
}

impl RoomSlot {
    fn new(doc: RoomDoc) -> Self {
        Self {
            revision: 1,
            doc,
            members: HashMap::new(),
            messages: BTreeMap::new(),
            next_message_id: 1,
            last_created_at_ms: 0,
            typing: HashMap::new(),
            blocked: HashMap::new(),
        }
    }

    fn versioned(&self) -> VersionedRoom {
        VersionedRoom {
            revision: self.revision,
            doc: self.doc.clone(),
        }
    }

    fn message_snapshot(&self) -> Vec<StoredMessage> {
        let mut messages: Vec<StoredMessage> = self.messages.values().cloned().collect();
        message::stream_order(&mut messages);
        messages
    }

    fn typing_snapshot(&self) -> Vec<TypingRecord> {
        self.typing
            .iter()
            .map(|(&participant, &since_ms)| TypingRecord {
                participant,
                since_ms,
            })
            .collect()
    }

    fn presence_snapshot(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|(&participant, record)| Member {
                participant,
                record: record.clone(),
            })
            .collect()
    }
}

impl<E: Environment> MemoryStore<E> {
    /// Creates an empty store that stamps writes from `env`.
    pub fn new(env: E) -> Self {
        Self {
            env,
            inner: Arc::new(Mutex::new(Inner {
                rooms: HashMap::new(),
                bus: Bus::new(),
            })),
        }
    }

    /// Number of rooms currently held. Useful in tests.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("Mutex poisoned")
    }
}

impl<E: Environment> Store for MemoryStore<E> {
    fn create_room(&self, code: RoomCode, doc: &RoomDoc) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        if inner.rooms.contains_key(&code) {
            return Err(StoreError::AlreadyExists(code));
        }
        let slot = RoomSlot::new(doc.clone());
        let versioned = slot.versioned();
        inner.rooms.insert(code, slot);
        inner.bus.publish_room(code, Some(versioned));
        Ok(1)
    }

    fn room(&self, code: RoomCode) -> Result<Option<VersionedRoom>, StoreError> {
        Ok(self.lock().rooms.get(&code).map(RoomSlot::versioned))
    }

    fn update_room(
        &self,
        code: RoomCode,
        expected: u64,
        doc: &RoomDoc,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .rooms
            .get_mut(&code)
            .ok_or(StoreError::RoomNotFound(code))?;
        if slot.revision != expected {
            return Err(StoreError::Conflict {
                expected: slot.revision,
                got: expected,
            });
        }
        slot.revision += 1;
        slot.doc = doc.clone();
        let versioned = slot.versioned();
        inner.bus.publish_room(code, Some(versioned));
        Ok(expected + 1)
    }

    fn put_member(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        record: &MemberRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .rooms
            .get_mut(&code)
            .ok_or(StoreError::RoomNotFound(code))?;
        slot.members.insert(participant, record.clone());
        let snapshot = slot.presence_snapshot();
        inner.bus.publish_presence(code, snapshot);
        Ok(())
    }

    fn remove_member(
        &self,
        code: RoomCode,
        participant: ParticipantId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Some(slot) = inner.rooms.get_mut(&code) else {
            return Ok(());
        };
        if slot.members.remove(&participant).is_some() {
            let snapshot = slot.presence_snapshot();
            inner.bus.publish_presence(code, snapshot);
        }
        Ok(())
    }

    fn members(&self, code: RoomCode) -> Result<Vec<Member>, StoreError> {
        Ok(self
            .lock()
            .rooms
            .get(&code)
            .map(RoomSlot::presence_snapshot)
            .unwrap_or_default())
    }

    fn append_message(
        &self,
        code: RoomCode,
        draft: &MessageDraft,
    ) -> Result<StoredMessage, StoreError> {
        let now_ms = self.env.now_ms();
        let mut inner = self.lock();
        let slot = inner
            .rooms
            .get_mut(&code)
            .ok_or(StoreError::RoomNotFound(code))?;

        let id = MessageId(slot.next_message_id);
        slot.next_message_id += 1;
        let created_at_ms = now_ms.max(slot.last_created_at_ms);
        slot.last_created_at_ms = created_at_ms;

        let stored = StoredMessage {
            id,
            sender: draft.sender,
            body: draft.body.clone(),
            created_at_ms,
            read_by: BTreeSet::new(),
            deleted: false,
        };
        slot.messages.insert(id, stored.clone());
        debug_assert!((slot.messages.len() as u64) < slot.next_message_id);

        let snapshot = slot.message_snapshot();
        inner.bus.publish_messages(code, snapshot);
        Ok(stored)
    }

    fn message(
        &self,
        code: RoomCode,
        id: MessageId,
    ) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self
            .lock()
            .rooms
            .get(&code)
            .and_then(|slot| slot.messages.get(&id).cloned()))
    }

    fn messages(&self, code: RoomCode) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .lock()
            .rooms
            .get(&code)
            .map(RoomSlot::message_snapshot)
            .unwrap_or_default())
    }

    fn tombstone_message(&self, code: RoomCode, id: MessageId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .rooms
            .get_mut(&code)
            .ok_or(StoreError::RoomNotFound(code))?;
        let stored = slot
            .messages
            .get_mut(&id)
            .ok_or(StoreError::MessageNotFound(id))?;
        if !stored.deleted {
            stored.body = MessageBody::Redacted;
            stored.deleted = true;
            let snapshot = slot.message_snapshot();
            inner.bus.publish_messages(code, snapshot);
        }
        Ok(())
    }

    fn mark_read(
        &self,
        code: RoomCode,
        id: MessageId,
        reader: ParticipantId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .rooms
            .get_mut(&code)
            .ok_or(StoreError::RoomNotFound(code))?;
        let stored = slot
            .messages
            .get_mut(&id)
            .ok_or(StoreError::MessageNotFound(id))?;
        if stored.deleted {
            return Ok(());
        }
        if stored.read_by.insert(reader) {
            let snapshot = slot.message_snapshot();
            inner.bus.publish_messages(code, snapshot);
        }
        Ok(())
    }

    fn set_typing(
        &self,
        code: RoomCode,
        participant: ParticipantId,
        since_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .rooms
            .get_mut(&code)
            .ok_or(StoreError::RoomNotFound(code))?;
        slot.typing.insert(participant, since_ms);
        let snapshot = slot.typing_snapshot();
        inner.bus.publish_typing(code, snapshot);
        Ok(())
    }

    fn clear_typing(
        &self,
        code: RoomCode,
        participant: ParticipantId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Some(slot) = inner.rooms.get_mut(&code) else {
            return Ok(());
        };
        if slot.typing.remove(&participant).is_some() {
            let snapshot = slot.typing_snapshot();
            inner.bus.publish_typing(code, snapshot);
        }
        Ok(())
    }

    fn blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
    ) -> Result<BTreeSet<ParticipantId>, StoreError> {
        Ok(self
            .lock()
            .rooms
            .get(&code)
            .and_then(|slot| slot.blocked.get(&owner).cloned())
            .unwrap_or_default())
    }

    fn put_blocked(
        &self,
        code: RoomCode,
        owner: ParticipantId,
        set: &BTreeSet<ParticipantId>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .rooms
            .get_mut(&code)
            .ok_or(StoreError::RoomNotFound(code))?;
        slot.blocked.insert(owner, set.clone());
        Ok(())
    }

    fn watch_room(&self, code: RoomCode) -> Feed<Option<VersionedRoom>> {
        let mut guard = self.lock();
        let Inner { rooms, bus } = &mut *guard;
        bus.watch_room(code, || rooms.get(&code).map(RoomSlot::versioned))
    }

    fn watch_messages(&self, code: RoomCode) -> Feed<Vec<StoredMessage>> {
        let mut guard = self.lock();
        let Inner { rooms, bus } = &mut *guard;
        bus.watch_messages(code, || {
            rooms
                .get(&code)
                .map(RoomSlot::message_snapshot)
                .unwrap_or_default()
        })
    }

    fn watch_typing(&self, code: RoomCode) -> Feed<Vec<TypingRecord>> {
        let mut guard = self.lock();
        let Inner { rooms, bus } = &mut *guard;
        bus.watch_typing(code, || {
            rooms
                .get(&code)
                .map(RoomSlot::typing_snapshot)
                .unwrap_or_default()
        })
    }

    fn watch_presence(&self, code: RoomCode) -> Feed<Vec<Member>> {
        let mut guard = self.lock();
        let Inner { rooms, bus } = &mut *guard;
        bus.watch_presence(code, || {
            rooms
                .get(&code)
                .map(RoomSlot::presence_snapshot)
                .unwrap_or_default()
        })
    }

    fn list_rooms(&self) -> Result<Vec<RoomCode>, StoreError> {
        Ok(self.lock().rooms.keys().copied().collect())
    }

    fn purge_expired(&self, now_ms: u64) -> Result<Vec<RoomCode>, StoreError> {
        let mut inner = self.lock();
        let expired: Vec<RoomCode> = inner
            .rooms
            .iter()
            .filter(|(_, slot)| slot.doc.is_expired(now_ms))
            .map(|(&code, _)| code)
            .collect();
        for &code in &expired {
            inner.rooms.remove(&code);
            inner.bus.close_room(code);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alcove_harness::SimEnv;

    use super::*;

    fn store() -> (MemoryStore<SimEnv>, SimEnv) {
        let env = SimEnv::new(7);
        (MemoryStore::new(env.clone()), env)
    }

    fn room_code(env: &SimEnv) -> RoomCode {
        RoomCode::generate(env)
    }

    fn draft(sender: u128, text: &str) -> MessageDraft {
        MessageDraft {
            sender: ParticipantId(sender),
            body: MessageBody::Text(text.to_owned()),
        }
    }

    #[test]
    fn new_store_is_empty() {
        let (store, _env) = store();
        assert_eq!(store.room_count(), 0);
        assert_eq!(store.list_rooms().unwrap(), vec![]);
    }

    #[test]
    fn create_then_read_room() {
        let (store, env) = store();
        let code = room_code(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(60));

        assert_eq!(store.create_room(code, &doc).unwrap(), 1);
        let versioned = store.room(code).unwrap().unwrap();
        assert_eq!(versioned.revision, 1);
        assert_eq!(versioned.doc, doc);
    }

    #[test]
    fn create_collision_is_reported() {
        let (store, env) = store();
        let code = room_code(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(60));

        store.create_room(code, &doc).unwrap();
        assert!(matches!(
            store.create_room(code, &doc),
            Err(StoreError::AlreadyExists(c)) if c == code
        ));
    }

    #[test]
    fn update_room_checks_revision() {
        let (store, env) = store();
        let code = room_code(&env);
        let mut doc = RoomDoc::new(env.now_ms(), Duration::from_secs(60));
        store.create_room(code, &doc).unwrap();

        doc.locked = true;
        assert_eq!(store.update_room(code, 1, &doc).unwrap(), 2);

        // A writer still holding revision 1 loses the race.
        let stale = store.update_room(code, 1, &doc);
        match stale {
            Err(StoreError::Conflict { expected, got }) => {
                assert_eq!(expected, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn append_assigns_sequential_ids_and_monotone_timestamps() {
        let (store, env) = store();
        let code = room_code(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(60));
        store.create_room(code, &doc).unwrap();

        let first = store.append_message(code, &draft(1, "one")).unwrap();
        env.advance_ms(5);
        let second = store.append_message(code, &draft(1, "two")).unwrap();

        assert_eq!(first.id, MessageId(1));
        assert_eq!(second.id, MessageId(2));
        assert!(second.created_at_ms >= first.created_at_ms);

        let history = store.messages(code).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, MessageId(1));
    }

    #[test]
    fn tombstone_redacts_in_place_and_is_idempotent() {
        let (store, env) = store();
        let code = room_code(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(60));
        store.create_room(code, &doc).unwrap();

        let stored = store.append_message(code, &draft(1, "secret")).unwrap();
        store
            .mark_read(code, stored.id, ParticipantId(2))
            .unwrap();

        store.tombstone_message(code, stored.id).unwrap();
        store.tombstone_message(code, stored.id).unwrap();

        let after = store.message(code, stored.id).unwrap().unwrap();
        assert!(after.deleted);
        assert_eq!(after.body, MessageBody::Redacted);
        assert_eq!(after.sender, ParticipantId(1));
        // Receipts freeze at deletion, they do not disappear.
        assert!(after.read_by.contains(&ParticipantId(2)));

        // No further receipts accumulate.
        store
            .mark_read(code, stored.id, ParticipantId(3))
            .unwrap();
        let frozen = store.message(code, stored.id).unwrap().unwrap();
        assert!(!frozen.read_by.contains(&ParticipantId(3)));
    }

    #[test]
    fn deletes_on_absent_rooms_are_no_ops() {
        let (store, env) = store();
        let code = room_code(&env);
        store.remove_member(code, ParticipantId(1)).unwrap();
        store.clear_typing(code, ParticipantId(1)).unwrap();
    }

    #[test]
    fn writes_on_absent_rooms_are_rejected() {
        let (store, env) = store();
        let code = room_code(&env);
        let record = MemberRecord {
            nickname: None,
            last_active_ms: 0,
        };
        assert!(matches!(
            store.put_member(code, ParticipantId(1), &record),
            Err(StoreError::RoomNotFound(_))
        ));
        assert!(matches!(
            store.append_message(code, &draft(1, "hi")),
            Err(StoreError::RoomNotFound(_))
        ));
    }

    #[test]
    fn purge_removes_room_and_subcollections() {
        let (store, env) = store();
        let code = room_code(&env);
        let doc = RoomDoc::new(env.now_ms(), Duration::from_secs(60));
        store.create_room(code, &doc).unwrap();
        store.append_message(code, &draft(1, "going away")).unwrap();
        store.set_typing(code, ParticipantId(1), env.now_ms()).unwrap();

        env.advance_ms(61_000);
        let purged = store.purge_expired(env.now_ms()).unwrap();
        assert_eq!(purged, vec![code]);

        assert!(store.room(code).unwrap().is_none());
        assert!(store.messages(code).unwrap().is_empty());
        assert_eq!(store.room_count(), 0);
    }
}

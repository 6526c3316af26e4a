//! In-process fan-out of store mutations to change-feed subscribers.
//!
//! One lazily created channel per room per collection. A channel is
//! born when the first subscriber arrives, primed with a snapshot read
//! at that moment; afterwards every mutation republishes the full
//! collection. Rooms without subscribers cost nothing on the write
//! path.
//!
//! The bus itself is a plain struct; the owning store serializes access
//! to it alongside its own state.

use std::collections::HashMap;

use alcove_core::{
    RoomCode,
    message::StoredMessage,
    presence::Member,
    store::{Feed, FeedPublisher, VersionedRoom},
    typing::TypingRecord,
};

#[derive(Default)]
struct RoomChannels {
    room: Option<FeedPublisher<Option<VersionedRoom>>>,
    messages: Option<FeedPublisher<Vec<StoredMessage>>>,
    typing: Option<FeedPublisher<Vec<TypingRecord>>>,
    presence: Option<FeedPublisher<Vec<Member>>>,
}

/// Per-room change-feed channels for one store instance.
pub(crate) struct Bus {
    channels: HashMap<RoomCode, RoomChannels>,
}

impl Bus {
    pub(crate) fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Subscribes to the room document, creating the channel primed
    /// with `initial` if this is the first subscriber.
    pub(crate) fn watch_room(
        &mut self,
        code: RoomCode,
        initial: impl FnOnce() -> Option<VersionedRoom>,
    ) -> Feed<Option<VersionedRoom>> {
        self.channels
            .entry(code)
            .or_default()
            .room
            .get_or_insert_with(|| FeedPublisher::new(initial()))
            .subscribe()
    }

    pub(crate) fn watch_messages(
        &mut self,
        code: RoomCode,
        initial: impl FnOnce() -> Vec<StoredMessage>,
    ) -> Feed<Vec<StoredMessage>> {
        self.channels
            .entry(code)
            .or_default()
            .messages
            .get_or_insert_with(|| FeedPublisher::new(initial()))
            .subscribe()
    }

    pub(crate) fn watch_typing(
        &mut self,
        code: RoomCode,
        initial: impl FnOnce() -> Vec<TypingRecord>,
    ) -> Feed<Vec<TypingRecord>> {
        self.channels
            .entry(code)
            .or_default()
            .typing
            .get_or_insert_with(|| FeedPublisher::new(initial()))
            .subscribe()
    }

    pub(crate) fn watch_presence(
        &mut self,
        code: RoomCode,
        initial: impl FnOnce() -> Vec<Member>,
    ) -> Feed<Vec<Member>> {
        self.channels
            .entry(code)
            .or_default()
            .presence
            .get_or_insert_with(|| FeedPublisher::new(initial()))
            .subscribe()
    }

    /// Publishes a new room document snapshot, if anyone is listening.
    pub(crate) fn publish_room(&self, code: RoomCode, value: Option<VersionedRoom>) {
        if let Some(publisher) = self.channels.get(&code).and_then(|c| c.room.as_ref()) {
            publisher.publish(value);
        }
    }

    pub(crate) fn publish_messages(&self, code: RoomCode, value: Vec<StoredMessage>) {
        if let Some(publisher) = self.channels.get(&code).and_then(|c| c.messages.as_ref()) {
            publisher.publish(value);
        }
    }

    pub(crate) fn publish_typing(&self, code: RoomCode, value: Vec<TypingRecord>) {
        if let Some(publisher) = self.channels.get(&code).and_then(|c| c.typing.as_ref()) {
            publisher.publish(value);
        }
    }

    pub(crate) fn publish_presence(&self, code: RoomCode, value: Vec<Member>) {
        if let Some(publisher) = self.channels.get(&code).and_then(|c| c.presence.as_ref()) {
            publisher.publish(value);
        }
    }

    /// Announces a purged room and drops its channels.
    ///
    /// Subscribers observe the final snapshots (no document, empty
    /// collections), then end of stream once the publishers go away.
    pub(crate) fn close_room(&mut self, code: RoomCode) {
        self.publish_room(code, None);
        self.publish_messages(code, Vec::new());
        self.publish_typing(code, Vec::new());
        self.publish_presence(code, Vec::new());
        self.channels.remove(&code);
    }
}

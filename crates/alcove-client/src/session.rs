//! Live room session: admission, heartbeat, and feed merging.
//!
//! A session wraps one participant's attachment to one room. Joining
//! runs the admission pass with backoff against lost revision races,
//! records the first heartbeat, and spawns two tasks: a heartbeat loop
//! that keeps the member's seat fresh, and a forwarder that merges the
//! store's four change feeds into one ordered stream of
//! [`SessionEvent`]s. Leaving (or dropping) aborts both tasks and the
//! typing auto-clear timer; a leaked timer would keep a departed
//! participant counted as active and wrongly block admissions.

use std::collections::BTreeSet;

use alcove_core::{
    Admission, Environment, MessageId, ParticipantId, RetryPolicy, RoomCode, RoomConfig,
    RoomError, Store, admission,
    external::BlobStore,
    lifecycle,
    message::{self, MessageBody, StoredMessage},
    presence::{self, Member},
    store::VersionedRoom,
    typing,
};
use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Events waiting in the channel before the forwarder blocks.
const EVENT_BUFFER: usize = 64;

/// One state change observed through the session's merged feeds.
///
/// Every variant carries a full snapshot, never a delta; intermediate
/// states may be skipped under load but the final state always
/// arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The room document changed (lock, close, membership). `None`
    /// once the room has been purged.
    Room(Option<VersionedRoom>),
    /// The ordered message history changed.
    Messages(Vec<StoredMessage>),
    /// Whether any other, unblocked participant is typing right now.
    SomeoneTyping(bool),
    /// Number of members with a fresh heartbeat.
    ActiveCount(usize),
}

/// One participant's live attachment to one room.
///
/// Created by [`RoomSession::join`]; consumed by
/// [`RoomSession::leave`] or plain drop, both of which stop every
/// timer the session started.
pub struct RoomSession<S: Store, E: Environment> {
    store: S,
    env: E,
    config: RoomConfig,
    policy: RetryPolicy,
    code: RoomCode,
    participant: ParticipantId,
    admission: Admission,
    events: mpsc::Receiver<SessionEvent>,
    heartbeat: JoinHandle<()>,
    forwarder: JoinHandle<()>,
    typing_timer: Option<JoinHandle<()>>,
}

impl<S: Store, E: Environment> RoomSession<S, E> {
    /// Joins `participant` into the room and attaches to its feeds.
    ///
    /// Admission retries lost revision races with the policy's backoff
    /// schedule, sleeping between attempts; terminal rejections
    /// (`Locked`, `Closed`, `Full`, ...) surface immediately. On
    /// success the first heartbeat is recorded before the session is
    /// returned, so the new member occupies their seat from the moment
    /// the join resolves.
    pub async fn join(
        store: S,
        env: E,
        config: RoomConfig,
        policy: RetryPolicy,
        code: RoomCode,
        participant: ParticipantId,
        nickname: Option<String>,
    ) -> Result<Self, SessionError> {
        let admission = enter_with_backoff(&store, &env, &config, &policy, code, participant)
            .await?;
        presence::heartbeat(&store, &env, code, participant, nickname.clone())?;
        info!(room = %code, %participant, ?admission, "session joined");

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let heartbeat = tokio::spawn(heartbeat_loop(
            store.clone(),
            env.clone(),
            config,
            code,
            participant,
            nickname,
        ));
        let forwarder = tokio::spawn(forward_feeds(
            store.clone(),
            env.clone(),
            config,
            code,
            participant,
            tx,
        ));

        Ok(Self {
            store,
            env,
            config,
            policy,
            code,
            participant,
            admission,
            events,
            heartbeat,
            forwarder,
            typing_timer: None,
        })
    }

    /// How this session's join resolved.
    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// The room this session is attached to.
    pub fn room(&self) -> RoomCode {
        self.code
    }

    /// The participant this session acts as.
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Next merged feed event. `None` once the room has been purged
    /// and its feeds closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Posts a text message, clearing this participant's typing
    /// indicator in the same user action.
    pub fn send_text(&mut self, text: &str) -> Result<StoredMessage, SessionError> {
        self.stop_typing()?;
        let stored = message::append(
            &self.store,
            &self.env,
            self.code,
            self.participant,
            MessageBody::Text(text.to_owned()),
        )?;
        Ok(stored)
    }

    /// Records a voice clip into the blob store and posts the message
    /// referencing it.
    pub async fn send_voice<B: BlobStore + ?Sized>(
        &mut self,
        blobs: &B,
        clip: Bytes,
        duration_ms: u64,
    ) -> Result<StoredMessage, SessionError> {
        let media = blobs.put(clip).await?;
        self.stop_typing()?;
        let stored = message::append(
            &self.store,
            &self.env,
            self.code,
            self.participant,
            MessageBody::Voice { media, duration_ms },
        )?;
        Ok(stored)
    }

    /// Redacts one of this participant's own messages.
    pub fn tombstone(&self, id: MessageId) -> Result<(), SessionError> {
        message::tombstone(&self.store, self.code, id, self.participant)?;
        Ok(())
    }

    /// Marks every message in a delivered snapshot that is still
    /// unread for this participant.
    ///
    /// Intended to run on each [`SessionEvent::Messages`] snapshot
    /// while the history is on screen. Own messages and tombstones are
    /// skipped; receipts are idempotent, so re-marking a snapshot is
    /// harmless.
    pub fn mark_visible_read(&self, snapshot: &[StoredMessage]) -> Result<(), SessionError> {
        for stored in snapshot {
            if stored.is_unread_by(self.participant) {
                message::mark_read(&self.store, self.code, stored.id, self.participant)?;
            }
        }
        Ok(())
    }

    /// Reports a keystroke, showing this participant as typing.
    ///
    /// Re-arms the auto-clear timer: the indicator clears on its own
    /// once the typing TTL passes without another keystroke, and
    /// immediately on send or [`stop_typing`](Self::stop_typing).
    pub fn keystroke(&mut self) -> Result<(), SessionError> {
        typing::set_typing(&self.store, &self.env, self.code, self.participant, true)?;

        if let Some(timer) = self.typing_timer.take() {
            timer.abort();
        }
        let store = self.store.clone();
        let env = self.env.clone();
        let code = self.code;
        let participant = self.participant;
        let ttl = self.config.typing_ttl;
        self.typing_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(err) = typing::set_typing(&store, &env, code, participant, false) {
                debug!(room = %code, error = %err, "typing auto-clear failed");
            }
        }));
        Ok(())
    }

    /// Clears this participant's typing indicator and its timer.
    pub fn stop_typing(&mut self) -> Result<(), SessionError> {
        if let Some(timer) = self.typing_timer.take() {
            timer.abort();
        }
        typing::set_typing(&self.store, &self.env, self.code, self.participant, false)?;
        Ok(())
    }

    /// Toggles the room lock (owner only). Returns the new locked
    /// state.
    pub fn toggle_lock(&self) -> Result<bool, SessionError> {
        let locked = lifecycle::toggle_lock(
            &self.store,
            &self.env,
            &self.policy,
            self.code,
            self.participant,
        )?;
        Ok(locked)
    }

    /// Closes the room permanently (owner only).
    pub fn close_forever(&self) -> Result<(), SessionError> {
        lifecycle::close_forever(
            &self.store,
            &self.env,
            &self.policy,
            self.code,
            self.participant,
        )?;
        Ok(())
    }

    /// Adds `target` to this participant's block list for the room.
    ///
    /// Blocking hides the target's typing signal from this observer.
    /// Idempotent: blocking twice writes nothing the second time.
    pub fn block(&self, target: ParticipantId) -> Result<(), SessionError> {
        let mut set = self.store.blocked(self.code, self.participant).map_err(RoomError::from)?;
        if set.insert(target) {
            self.store
                .put_blocked(self.code, self.participant, &set)
                .map_err(RoomError::from)?;
        }
        Ok(())
    }

    /// The full ordered message history, readable regardless of
    /// lifecycle: members of a closed room keep read access.
    pub fn history(&self) -> Result<Vec<StoredMessage>, SessionError> {
        let messages = self.store.messages(self.code).map_err(RoomError::from)?;
        Ok(messages)
    }

    /// Detaches cleanly: stops every timer, then removes this
    /// participant's presence and typing records.
    ///
    /// Admission is permanent, so leaving never shrinks the allowed
    /// set; a later [`join`](Self::join) resolves as
    /// [`Admission::AlreadyMember`] even on a locked room.
    pub fn leave(mut self) -> Result<(), SessionError> {
        self.abort_tasks();
        presence::detach(&self.store, self.code, self.participant)?;
        info!(room = %self.code, participant = %self.participant, "session left");
        Ok(())
    }

    fn abort_tasks(&mut self) {
        self.heartbeat.abort();
        self.forwarder.abort();
        if let Some(timer) = self.typing_timer.take() {
            timer.abort();
        }
    }
}

impl<S: Store, E: Environment> Drop for RoomSession<S, E> {
    /// Dropping without [`leave`](Self::leave) still stops every
    /// timer; the presence record then ages out of the freshness
    /// window on its own.
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Admission with sleeping backoff between lost races.
///
/// The sync engine retries immediately; this wrapper paces retries
/// with the policy's delay schedule so contending clients spread out
/// instead of re-colliding.
async fn enter_with_backoff<S: Store, E: Environment>(
    store: &S,
    env: &E,
    config: &RoomConfig,
    policy: &RetryPolicy,
    code: RoomCode,
    participant: ParticipantId,
) -> Result<Admission, RoomError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match admission::try_enter(store, env, config, code, participant) {
            Err(err) if err.is_transient() => {
                if attempts >= policy.max_attempts {
                    warn!(room = %code, attempts, "admission retries exhausted");
                    return Err(RoomError::Contended { attempts });
                }
                let delay = policy.delay(attempts - 1);
                debug!(room = %code, attempts, ?delay, "admission race lost, backing off");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Refreshes the member record until the room stops accepting writes.
async fn heartbeat_loop<S: Store, E: Environment>(
    store: S,
    env: E,
    config: RoomConfig,
    code: RoomCode,
    participant: ParticipantId,
    nickname: Option<String>,
) {
    let mut ticker = tokio::time::interval(config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The join already recorded the first heartbeat.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match presence::heartbeat(&store, &env, code, participant, nickname.clone()) {
            Ok(()) => {}
            Err(
                err @ (RoomError::Closed | RoomError::Expired | RoomError::NotFound(_)),
            ) => {
                debug!(room = %code, %participant, error = %err, "heartbeat stopped");
                break;
            }
            Err(err) => warn!(room = %code, %participant, error = %err, "heartbeat failed"),
        }
    }
}

/// Merges the room's four change feeds into the session's event
/// channel.
///
/// Each feed snapshot is translated at delivery time: typing records
/// are filtered through the observer's block list and freshness
/// window, presence through the active window. Ends when the feeds
/// close (room purged) or the session is dropped.
async fn forward_feeds<S: Store, E: Environment>(
    store: S,
    env: E,
    config: RoomConfig,
    code: RoomCode,
    observer: ParticipantId,
    tx: mpsc::Sender<SessionEvent>,
) {
    let mut room_feed = store.watch_room(code);
    let mut message_feed = store.watch_messages(code);
    let mut typing_feed = store.watch_typing(code);
    let mut presence_feed = store.watch_presence(code);

    loop {
        let event = tokio::select! {
            snapshot = room_feed.next() => snapshot.map(SessionEvent::Room),
            snapshot = message_feed.next() => snapshot.map(SessionEvent::Messages),
            snapshot = typing_feed.next() => snapshot.map(|records| {
                let blocked = blocked_or_empty(&store, code, observer);
                SessionEvent::SomeoneTyping(typing::someone_else_typing(
                    &records,
                    observer,
                    &blocked,
                    env.now_ms(),
                    config.typing_ttl_ms(),
                ))
            }),
            snapshot = presence_feed.next() => snapshot.map(|members: Vec<Member>| {
                SessionEvent::ActiveCount(presence::active_count(
                    &members,
                    env.now_ms(),
                    config.presence_window_ms(),
                ))
            }),
        };

        let Some(event) = event else { break };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

fn blocked_or_empty<S: Store>(
    store: &S,
    code: RoomCode,
    observer: ParticipantId,
) -> BTreeSet<ParticipantId> {
    store.blocked(code, observer).unwrap_or_else(|err| {
        warn!(room = %code, error = %err, "block list unavailable, treating as empty");
        BTreeSet::new()
    })
}

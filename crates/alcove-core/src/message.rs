//! Message records and the append, redact, and read-receipt operations.
//!
//! The store assigns each appended message its identifier and a
//! server-side timestamp, so stream order is decided by the writer of
//! record rather than by client clocks. Deleting a message never
//! removes it from the stream: the record is redacted in place, keeping
//! its position and read receipts while the content goes away.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    env::Environment,
    error::RoomError,
    ident::{MediaRef, MessageId, ParticipantId, RoomCode},
    store::Store,
};

/// Content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Plain text, stored trimmed of surrounding whitespace.
    Text(String),
    /// A recorded voice clip held in the blob store.
    Voice {
        /// Location of the audio blob.
        media: MediaRef,
        /// Clip length as measured at recording time.
        duration_ms: u64,
    },
    /// The body of a deleted message. Never accepted in a draft; only
    /// redaction produces it.
    Redacted,
}

impl MessageBody {
    /// Validates and normalizes a draft body.
    ///
    /// Text is trimmed before storage; a body that trims to nothing is
    /// rejected, as is an attempt to post an already-redacted body.
    pub fn normalized(self) -> Result<Self, RoomError> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(RoomError::EmptyMessage);
                }
                if trimmed.len() == text.len() {
                    Ok(Self::Text(text))
                } else {
                    Ok(Self::Text(trimmed.to_owned()))
                }
            }
            Self::Voice { .. } => Ok(self),
            Self::Redacted => Err(RoomError::EmptyMessage),
        }
    }
}

/// A validated message the store has not yet accepted.
///
/// The store fills in the identifier and timestamp on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Author of the message.
    pub sender: ParticipantId,
    /// Content to store.
    pub body: MessageBody,
}

/// A message as it exists in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Store-assigned identifier, unique within the room.
    pub id: MessageId,
    /// Author of the message. Immutable, including through redaction.
    pub sender: ParticipantId,
    /// Current content. [`MessageBody::Redacted`] once deleted.
    pub body: MessageBody,
    /// Store-assigned timestamp, monotone within the room.
    pub created_at_ms: u64,
    /// Participants who have marked the message read. Grows only.
    pub read_by: BTreeSet<ParticipantId>,
    /// Redaction flag. `true` exactly when `body` is redacted.
    pub deleted: bool,
}

impl StoredMessage {
    /// Sort key for stream order.
    ///
    /// Messages order by timestamp first, with the store-assigned id
    /// breaking ties, so two messages accepted in the same millisecond
    /// still have one stable order everywhere.
    #[must_use]
    pub fn order_key(&self) -> (u64, MessageId) {
        (self.created_at_ms, self.id)
    }

    /// Whether `viewer` still has this message to read.
    ///
    /// Redacted messages and the viewer's own messages never count as
    /// unread.
    #[must_use]
    pub fn is_unread_by(&self, viewer: ParticipantId) -> bool {
        !self.deleted && self.sender != viewer && !self.read_by.contains(&viewer)
    }
}

/// Sorts messages into stream order in place.
pub fn stream_order(messages: &mut [StoredMessage]) {
    messages.sort_unstable_by_key(StoredMessage::order_key);
}

/// Appends a message to the room's stream.
///
/// The room must exist, still accept writes, and count the sender among
/// its members. On success the store-assigned record is returned, with
/// its id and timestamp filled in.
pub fn append<S: Store, E: Environment>(
    store: &S,
    env: &E,
    code: RoomCode,
    sender: ParticipantId,
    body: MessageBody,
) -> Result<StoredMessage, RoomError> {
    let body = body.normalized()?;
    let room = store.room(code)?.ok_or(RoomError::NotFound(code))?;
    room.doc.ensure_writable(env.now_ms())?;
    if !room.doc.is_member(sender) {
        return Err(RoomError::Unauthorized {
            participant: sender,
            action: "post in this room",
        });
    }
    let stored = store.append_message(code, &MessageDraft { sender, body })?;
    debug!(room = %code, message = %stored.id, "message appended");
    Ok(stored)
}

/// Redacts a message in place, on behalf of `requester`.
///
/// Only the author may redact their own message. The operation is
/// idempotent for the author and works regardless of room lifecycle: a
/// participant can always take back their own words, even after the
/// room closes.
pub fn tombstone<S: Store>(
    store: &S,
    code: RoomCode,
    id: MessageId,
    requester: ParticipantId,
) -> Result<(), RoomError> {
    let message = store
        .message(code, id)?
        .ok_or(RoomError::MessageNotFound(id))?;
    if message.sender != requester {
        return Err(RoomError::Unauthorized {
            participant: requester,
            action: "redact another participant's message",
        });
    }
    if message.deleted {
        return Ok(());
    }
    store.tombstone_message(code, id)?;
    debug!(room = %code, message = %id, "message redacted");
    Ok(())
}

/// Records that `reader` has seen the message.
///
/// Receipts grow monotonically and are idempotent. The author never
/// appears in their own receipt set, and redacted messages take no
/// further receipts; both cases are silent successes so clients can
/// blindly mark whatever the stream shows them.
pub fn mark_read<S: Store>(
    store: &S,
    code: RoomCode,
    id: MessageId,
    reader: ParticipantId,
) -> Result<(), RoomError> {
    let message = store
        .message(code, id)?
        .ok_or(RoomError::MessageNotFound(id))?;
    if message.sender == reader || message.deleted {
        return Ok(());
    }
    store.mark_read(code, id, reader)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> MessageBody {
        MessageBody::Text(s.to_owned())
    }

    fn stored(id: u64, sender: u128, created_at_ms: u64) -> StoredMessage {
        StoredMessage {
            id: MessageId(id),
            sender: ParticipantId(sender),
            body: text("hello"),
            created_at_ms,
            read_by: BTreeSet::new(),
            deleted: false,
        }
    }

    #[test]
    fn text_is_trimmed_on_normalize() {
        let body = text("  hi there  ").normalized().unwrap();
        assert_eq!(body, text("hi there"));
    }

    #[test]
    fn inner_whitespace_survives_normalization() {
        let body = text("a  b").normalized().unwrap();
        assert_eq!(body, text("a  b"));
    }

    #[test]
    fn whitespace_only_text_is_rejected() {
        assert!(matches!(
            text("   \n\t ").normalized(),
            Err(RoomError::EmptyMessage)
        ));
        assert!(matches!(text("").normalized(), Err(RoomError::EmptyMessage)));
    }

    #[test]
    fn redacted_draft_is_rejected() {
        assert!(matches!(
            MessageBody::Redacted.normalized(),
            Err(RoomError::EmptyMessage)
        ));
    }

    #[test]
    fn voice_body_passes_through() {
        let body = MessageBody::Voice {
            media: MediaRef("voice/abc".to_owned()),
            duration_ms: 1_200,
        };
        assert_eq!(body.clone().normalized().unwrap(), body);
    }

    #[test]
    fn stream_order_sorts_by_timestamp_then_id() {
        let mut messages = vec![stored(3, 1, 200), stored(2, 1, 100), stored(1, 1, 200)];
        stream_order(&mut messages);
        let ids: Vec<u64> = messages.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn unread_tracks_sender_receipts_and_redaction() {
        let viewer = ParticipantId(2);
        let mut message = stored(1, 1, 100);
        assert!(message.is_unread_by(viewer));
        assert!(!message.is_unread_by(ParticipantId(1)));

        message.read_by.insert(viewer);
        assert!(!message.is_unread_by(viewer));

        let mut redacted = stored(2, 1, 200);
        redacted.body = MessageBody::Redacted;
        redacted.deleted = true;
        assert!(!redacted.is_unread_by(viewer));
    }
}

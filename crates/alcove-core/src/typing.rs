//! Ephemeral typing indicators with read-side freshness filtering.
//!
//! A typing record only means "typing now" while it is younger than the
//! configured TTL. Clients re-arm their record on every keystroke and
//! clear it on send or blur, but a crashed client never clears, so the
//! indicator is derived by filtering on record age at read time rather
//! than trusting the record's existence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    env::Environment,
    error::RoomError,
    ident::{ParticipantId, RoomCode},
    store::Store,
};

/// Stored typing state for one participant in one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingRecord {
    /// Participant whose keystrokes produced the record.
    pub participant: ParticipantId,
    /// Time of the most recent keystroke, in milliseconds since the epoch.
    pub since_ms: u64,
}

/// Returns `true` while the record is younger than `ttl_ms` at `now_ms`.
///
/// Half-open like the presence window: a record exactly `ttl_ms` old
/// has expired.
#[must_use]
pub fn is_fresh(record: &TypingRecord, now_ms: u64, ttl_ms: u64) -> bool {
    now_ms.saturating_sub(record.since_ms) < ttl_ms
}

/// Derives the "someone else is typing" indicator for `observer`.
///
/// A record counts only if it is fresh, owned by another participant,
/// and its owner is not in the observer's block list.
#[must_use]
pub fn someone_else_typing(
    records: &[TypingRecord],
    observer: ParticipantId,
    blocked: &BTreeSet<ParticipantId>,
    now_ms: u64,
    ttl_ms: u64,
) -> bool {
    records.iter().any(|record| {
        record.participant != observer
            && !blocked.contains(&record.participant)
            && is_fresh(record, now_ms, ttl_ms)
    })
}

/// Upserts or clears `participant`'s typing record.
///
/// Turning the indicator on is a write into the room and obeys the same
/// lifecycle rules as posting: it fails once the room is closed or
/// expired, and it requires membership. Turning it off is cleanup and
/// never fails for lifecycle reasons, so a client blurring the composer
/// of a freshly closed room does not leave a record behind.
pub fn set_typing<S: Store, E: Environment>(
    store: &S,
    env: &E,
    code: RoomCode,
    participant: ParticipantId,
    typing: bool,
) -> Result<(), RoomError> {
    if !typing {
        store.clear_typing(code, participant)?;
        return Ok(());
    }
    let now_ms = env.now_ms();
    let room = store.room(code)?.ok_or(RoomError::NotFound(code))?;
    room.doc.ensure_writable(now_ms)?;
    if !room.doc.is_member(participant) {
        return Err(RoomError::Unauthorized {
            participant,
            action: "signal typing in this room",
        });
    }
    store.set_typing(code, participant, now_ms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u128, since_ms: u64) -> TypingRecord {
        TypingRecord {
            participant: ParticipantId(n),
            since_ms,
        }
    }

    #[test]
    fn record_expires_at_ttl_boundary() {
        let r = record(1, 10_000);
        assert!(is_fresh(&r, 11_999, 2_000));
        assert!(!is_fresh(&r, 12_000, 2_000));
    }

    #[test]
    fn own_record_is_ignored() {
        let records = vec![record(1, 10_000)];
        let blocked = BTreeSet::new();
        assert!(!someone_else_typing(
            &records,
            ParticipantId(1),
            &blocked,
            10_100,
            2_000
        ));
    }

    #[test]
    fn blocked_participant_is_hidden() {
        let records = vec![record(2, 10_000)];
        let blocked = BTreeSet::from([ParticipantId(2)]);
        assert!(!someone_else_typing(
            &records,
            ParticipantId(1),
            &blocked,
            10_100,
            2_000
        ));
    }

    #[test]
    fn stale_record_does_not_show() {
        let records = vec![record(2, 10_000)];
        let blocked = BTreeSet::new();
        assert!(!someone_else_typing(
            &records,
            ParticipantId(1),
            &blocked,
            13_000,
            2_000
        ));
    }

    #[test]
    fn fresh_record_from_another_participant_shows() {
        let records = vec![record(1, 9_000), record(2, 10_000)];
        let blocked = BTreeSet::new();
        assert!(someone_else_typing(
            &records,
            ParticipantId(1),
            &blocked,
            10_100,
            2_000
        ));
    }
}

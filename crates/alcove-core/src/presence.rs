//! Presence tracking backed by per-member heartbeat records.
//!
//! A member is *active* while their most recent heartbeat falls inside
//! the configured freshness window. Capacity checks during admission
//! count active members only, so a crashed client stops occupying a
//! seat as soon as its record goes stale. Attached clients upsert their
//! record on a timer and remove it best-effort on detach.

use serde::{Deserialize, Serialize};

use crate::{
    env::Environment,
    error::RoomError,
    ident::{ParticipantId, RoomCode},
    store::Store,
};

/// Stored heartbeat state for one member of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Display name chosen by the participant, if any.
    pub nickname: Option<String>,
    /// Time of the most recent heartbeat, in milliseconds since the epoch.
    pub last_active_ms: u64,
}

/// A member record together with the participant that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Owner of the record.
    pub participant: ParticipantId,
    /// Heartbeat state.
    pub record: MemberRecord,
}

/// Returns `true` while the record's heartbeat is fresh at `now_ms`.
///
/// The window is half-open: a record exactly `window_ms` old is stale.
/// A record stamped in the future (clock skew between writers) counts
/// as fresh rather than wrapping.
#[must_use]
pub fn is_active(record: &MemberRecord, now_ms: u64, window_ms: u64) -> bool {
    now_ms.saturating_sub(record.last_active_ms) < window_ms
}

/// Counts members whose heartbeat is still fresh at `now_ms`.
#[must_use]
pub fn active_count(members: &[Member], now_ms: u64, window_ms: u64) -> usize {
    members
        .iter()
        .filter(|member| is_active(&member.record, now_ms, window_ms))
        .count()
}

/// Records a heartbeat for `participant`, refreshing their seat in the
/// room's capacity count.
///
/// Only admitted participants may heartbeat; anyone else would occupy a
/// seat without ever having passed admission. Fails with
/// [`RoomError::Expired`] or [`RoomError::Closed`] once the room stops
/// accepting writes, which is the signal for callers to stop their
/// heartbeat timer.
pub fn heartbeat<S: Store, E: Environment>(
    store: &S,
    env: &E,
    code: RoomCode,
    participant: ParticipantId,
    nickname: Option<String>,
) -> Result<(), RoomError> {
    let now_ms = env.now_ms();
    let room = store.room(code)?.ok_or(RoomError::NotFound(code))?;
    room.doc.ensure_writable(now_ms)?;
    if !room.doc.is_member(participant) {
        return Err(RoomError::Unauthorized {
            participant,
            action: "report presence in this room",
        });
    }
    let record = MemberRecord {
        nickname,
        last_active_ms: now_ms,
    };
    store.put_member(code, participant, &record)?;
    Ok(())
}

/// Removes `participant`'s presence and typing records.
///
/// Cleanup must succeed regardless of room lifecycle: a departing
/// member of a closed room still has to free their seat, otherwise the
/// stale record keeps counting toward capacity until it ages out of the
/// freshness window. Absent records are a no-op.
pub fn detach<S: Store>(
    store: &S,
    code: RoomCode,
    participant: ParticipantId,
) -> Result<(), RoomError> {
    store.remove_member(code, participant)?;
    store.clear_typing(code, participant)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(n: u128, last_active_ms: u64) -> Member {
        Member {
            participant: ParticipantId(n),
            record: MemberRecord {
                nickname: None,
                last_active_ms,
            },
        }
    }

    #[test]
    fn freshness_window_is_half_open() {
        let record = MemberRecord {
            nickname: None,
            last_active_ms: 1_000,
        };
        assert!(is_active(&record, 1_000, 30_000));
        assert!(is_active(&record, 30_999, 30_000));
        assert!(!is_active(&record, 31_000, 30_000));
    }

    #[test]
    fn future_heartbeat_counts_as_fresh() {
        let record = MemberRecord {
            nickname: None,
            last_active_ms: 5_000,
        };
        assert!(is_active(&record, 4_000, 30_000));
    }

    #[test]
    fn active_count_ignores_stale_members() {
        let members = vec![
            member(1, 90_000),
            member(2, 70_001),
            member(3, 70_000),
            member(4, 0),
        ];
        assert_eq!(active_count(&members, 100_000, 30_000), 2);
    }

    #[test]
    fn active_count_of_empty_roster_is_zero() {
        assert_eq!(active_count(&[], 100_000, 30_000), 0);
    }
}

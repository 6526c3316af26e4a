//! Room admission: the gate every participant passes through exactly
//! once per room.
//!
//! Admission reads the room, decides, and writes back through a
//! revision-checked update, so two concurrent entrants can never both
//! observe the same vacancy. One pass evaluates, in order: room
//! existence, lifecycle, prior membership, the lock, the
//! first-entrant-becomes-owner rule, capacity, and finally the guest
//! insert with its one-time auto-lock. Prior membership resolves before
//! the lock so that a returning member of a locked room is recognized
//! rather than shut out, and it writes nothing, so re-entry can never
//! re-trigger the auto-lock or count against capacity.

use tracing::{debug, trace};

use crate::{
    config::{RetryPolicy, RoomConfig},
    env::Environment,
    error::RoomError,
    ident::{ParticipantId, RoomCode},
    presence::{self, Member},
    room::RoomDoc,
    store::Store,
};

/// Successful admission outcomes.
///
/// Rejections are [`RoomError`] values; this type only distinguishes a
/// fresh admission from an idempotent re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The participant was written into the allowed set.
    Admitted(EntrantRole),
    /// The participant was already in the allowed set. Nothing was
    /// written.
    AlreadyMember,
}

/// Role assigned by a fresh admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrantRole {
    /// First entrant ever; the room is now theirs.
    Owner,
    /// Any later entrant.
    Guest {
        /// Whether this admission was the room's first guest and
        /// therefore locked the door behind itself.
        auto_locked: bool,
    },
}

/// Runs one full admission pass for `participant`.
///
/// The decision and the resulting room mutation are applied as a single
/// conditional update against the revision the decision was read from.
/// A concurrent writer surfaces as a transient
/// [`StoreError::Conflict`](crate::StoreError::Conflict); callers
/// re-run the pass against fresh state, or use [`enter`] which does so
/// with a bounded attempt budget.
pub fn try_enter<S: Store, E: Environment>(
    store: &S,
    env: &E,
    config: &RoomConfig,
    code: RoomCode,
    participant: ParticipantId,
) -> Result<Admission, RoomError> {
    let now_ms = env.now_ms();
    let versioned = store.room(code)?.ok_or(RoomError::NotFound(code))?;
    let mut doc = versioned.doc;
    doc.ensure_writable(now_ms)?;
    if doc.is_member(participant) {
        trace!(room = %code, %participant, "re-entry by existing member");
        return Ok(Admission::AlreadyMember);
    }
    if doc.locked {
        return Err(RoomError::Locked);
    }

    let role = if doc.claim_first_entrant(participant) {
        EntrantRole::Owner
    } else {
        let members = store.members(code)?;
        let seated = active_seats(&members, &doc, now_ms, config.presence_window_ms());
        if seated >= config.capacity {
            return Err(RoomError::Full);
        }
        let auto_locked = doc.admit_guest(participant);
        EntrantRole::Guest { auto_locked }
    };

    store.update_room(code, versioned.revision, &doc)?;
    debug!(room = %code, %participant, ?role, "participant admitted");
    Ok(Admission::Admitted(role))
}

/// Admits `participant`, retrying lost revision races up to the
/// policy's attempt budget.
///
/// Each retry re-reads the room, so the decision is always made against
/// fresh state. Returns [`RoomError::Contended`] once the budget is
/// spent.
pub fn enter<S: Store, E: Environment>(
    store: &S,
    env: &E,
    config: &RoomConfig,
    policy: &RetryPolicy,
    code: RoomCode,
    participant: ParticipantId,
) -> Result<Admission, RoomError> {
    policy.run(|| try_enter(store, env, config, code, participant))
}

/// Number of capacity seats currently held.
///
/// A seat is held by a participant who is both in the allowed set and
/// actively heartbeating. Presence records are not revision-checked;
/// the count is re-read on every admission pass.
fn active_seats(members: &[Member], doc: &RoomDoc, now_ms: u64, window_ms: u64) -> usize {
    members
        .iter()
        .filter(|member| {
            doc.is_member(member.participant)
                && presence::is_active(&member.record, now_ms, window_ms)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::MemberRecord;

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
    fn seats_require_membership_and_freshness() {
        let mut doc = RoomDoc::new(0, std::time::Duration::from_secs(60));
        assert!(doc.claim_first_entrant(ParticipantId(1)));
        doc.admit_guest(ParticipantId(2));

        let members = vec![
            member(1, 95_000),
            member(2, 40_000),
            member(9, 99_000), // heartbeating but never admitted
        ];
        assert_eq!(active_seats(&members, &doc, 100_000, 30_000), 1);
    }
}

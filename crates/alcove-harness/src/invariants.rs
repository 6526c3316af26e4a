//! Invariant checks over room state.
//!
//! These capture properties that must hold after every operation
//! sequence, independent of the specific scenario that produced the
//! state. Scenario tests and property tests run them against final
//! store state.

use alcove_core::{
    RoomCode, Store,
    message::{MessageBody, StoredMessage},
    room::RoomDoc,
    store::StoreError,
};

/// A broken invariant, naming the rule and the offending state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Short rule name.
    pub rule: &'static str,
    /// What the state looked like.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Checks structural invariants of a room document.
///
/// - A closed room is always locked.
/// - The owner, once set, is in the allowed set.
/// - The room expires after it was created.
pub fn check_room(doc: &RoomDoc) -> Result<(), Violation> {
    if doc.closed && !doc.locked {
        return Err(Violation {
            rule: "closed-implies-locked",
            message: format!("closed room with locked={}", doc.locked),
        });
    }
    if let Some(owner) = doc.owner {
        if !doc.is_member(owner) {
            return Err(Violation {
                rule: "owner-is-allowed",
                message: format!("owner {owner} missing from allowed set"),
            });
        }
    }
    if doc.expires_at_ms <= doc.created_at_ms {
        return Err(Violation {
            rule: "expiry-after-creation",
            message: format!(
                "created_at {} >= expires_at {}",
                doc.created_at_ms, doc.expires_at_ms
            ),
        });
    }
    Ok(())
}

/// Checks stream invariants of an ordered message history.
///
/// - Ids strictly increase along the stream.
/// - Timestamps never decrease along the stream.
/// - A tombstoned message carries no body.
/// - A sender never appears in their own message's read set.
pub fn check_messages(messages: &[StoredMessage]) -> Result<(), Violation> {
    for window in messages.windows(2) {
        if window[1].id <= window[0].id {
            return Err(Violation {
                rule: "stream-ids-increase",
                message: format!("id {} followed by id {}", window[0].id, window[1].id),
            });
        }
        if window[1].created_at_ms < window[0].created_at_ms {
            return Err(Violation {
                rule: "stream-time-monotone",
                message: format!(
                    "timestamp {} followed by {}",
                    window[0].created_at_ms, window[1].created_at_ms
                ),
            });
        }
    }
    for message in messages {
        if message.deleted && message.body != MessageBody::Redacted {
            return Err(Violation {
                rule: "tombstone-clears-body",
                message: format!("message {} deleted but body remains", message.id),
            });
        }
        if message.read_by.contains(&message.sender) {
            return Err(Violation {
                rule: "sender-not-in-read-set",
                message: format!("message {} read by its own sender", message.id),
            });
        }
    }
    Ok(())
}

/// Runs every check against a room's stored state.
///
/// An absent room trivially satisfies everything. Store failures are
/// reported as violations so property tests surface them the same way.
pub fn check_store_state<S: Store>(store: &S, code: RoomCode) -> Vec<Violation> {
    let mut violations = Vec::new();

    match store.room(code) {
        Ok(Some(versioned)) => {
            if let Err(violation) = check_room(&versioned.doc) {
                violations.push(violation);
            }
        }
        Ok(None) => return violations,
        Err(err) => {
            violations.push(store_violation(&err));
            return violations;
        }
    }

    match store.messages(code) {
        Ok(messages) => {
            if let Err(violation) = check_messages(&messages) {
                violations.push(violation);
            }
        }
        Err(err) => violations.push(store_violation(&err)),
    }

    violations
}

fn store_violation(err: &StoreError) -> Violation {
    Violation {
        rule: "store-readable",
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::Duration};

    use alcove_core::{MessageId, ParticipantId};

    use super::*;

    fn message(id: u64, created_at_ms: u64) -> StoredMessage {
        StoredMessage {
            id: MessageId(id),
            sender: ParticipantId(1),
            body: MessageBody::Text("hello".to_owned()),
            created_at_ms,
            read_by: BTreeSet::new(),
            deleted: false,
        }
    }

    #[test]
    fn healthy_room_passes() {
        let mut doc = RoomDoc::new(1_000, Duration::from_secs(60));
        assert!(doc.claim_first_entrant(ParticipantId(1)));
        assert!(check_room(&doc).is_ok());
    }

    #[test]
    fn closed_unlocked_room_is_flagged() {
        let mut doc = RoomDoc::new(1_000, Duration::from_secs(60));
        doc.closed = true;
        doc.locked = false;

        let violation = check_room(&doc).expect_err("must be flagged");
        assert_eq!(violation.rule, "closed-implies-locked");
    }

    #[test]
    fn duplicate_id_is_flagged() {
        let history = vec![message(1, 10), message(1, 20)];
        let violation = check_messages(&history).expect_err("must be flagged");
        assert_eq!(violation.rule, "stream-ids-increase");
    }

    #[test]
    fn lingering_tombstone_body_is_flagged() {
        let mut deleted = message(1, 10);
        deleted.deleted = true;

        let violation = check_messages(&[deleted]).expect_err("must be flagged");
        assert_eq!(violation.rule, "tombstone-clears-body");
    }

    #[test]
    fn ordered_history_passes() {
        let history = vec![message(1, 10), message(2, 10), message(3, 25)];
        assert!(check_messages(&history).is_ok());
    }
}

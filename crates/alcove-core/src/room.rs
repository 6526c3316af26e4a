//! Room document and its lifecycle transition rules.
//!
//! Phase diagram:
//!
//! ```text
//!        toggle_lock
//!   OPEN <---------> LOCKED
//!     \                /
//!      \ close_forever/
//!       v            v
//!          CLOSED          (terminal; closed implies locked)
//! ```
//!
//! Two product rules are easy to lose in refactors, so they are explicit
//! named methods rather than inline conditionals:
//!
//! - **first-entrant-becomes-owner** ([`RoomDoc::claim_first_entrant`]): the
//!   first participant ever admitted owns the room.
//! - **auto-lock-after-first-guest** ([`RoomDoc::admit_guest`]): the first
//!   non-owner admission locks the room in the same mutation (single-use
//!   invite). The rule fires at most once per room.

use std::{collections::BTreeSet, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::RoomError, ident::ParticipantId};

/// Coarse room phase derived from the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Accepting admissions (subject to capacity).
    Open,
    /// Rejecting new admissions; members unaffected.
    Locked,
    /// Terminal. Rejects everything, including former members.
    Closed,
}

/// The room document, the unit of conditional writes.
///
/// `allowed` is the authoritative membership ledger: append-only for the life
/// of the room. Presence decay never removes anyone from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDoc {
    /// First participant ever admitted. Immutable once set.
    pub owner: Option<ParticipantId>,
    /// Every participant ever admitted.
    pub allowed: BTreeSet<ParticipantId>,
    /// Admissions currently rejected.
    pub locked: bool,
    /// Terminal flag. `closed` implies `locked`.
    pub closed: bool,
    /// Store-assigned creation time, epoch milliseconds.
    pub created_at_ms: u64,
    /// `created_at_ms` + TTL. Past this, every write path treats the room as
    /// dead.
    pub expires_at_ms: u64,
}

impl RoomDoc {
    /// Fresh open room with the given lifetime.
    pub fn new(now_ms: u64, ttl: Duration) -> Self {
        Self {
            owner: None,
            allowed: BTreeSet::new(),
            locked: false,
            closed: false,
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(ttl.as_millis() as u64),
        }
    }

    /// Current phase. `closed` dominates `locked`.
    pub fn phase(&self) -> RoomPhase {
        if self.closed {
            RoomPhase::Closed
        } else if self.locked {
            RoomPhase::Locked
        } else {
            RoomPhase::Open
        }
    }

    /// True past the TTL.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// True if the participant was ever admitted.
    pub fn is_member(&self, participant: ParticipantId) -> bool {
        self.allowed.contains(&participant)
    }

    /// Number of admitted non-owners.
    pub fn guest_count(&self) -> usize {
        match self.owner {
            Some(owner) => self.allowed.iter().filter(|p| **p != owner).count(),
            None => self.allowed.len(),
        }
    }

    /// **first-entrant-becomes-owner**: if no owner is set, this entrant
    /// becomes the owner and is admitted. Returns whether the rule applied.
    ///
    /// The owner is always implicitly a member and never triggers auto-lock.
    pub fn claim_first_entrant(&mut self, entrant: ParticipantId) -> bool {
        if self.owner.is_some() {
            return false;
        }

        self.owner = Some(entrant);
        self.allowed.insert(entrant);
        debug_assert!(self.invariants_hold());
        true
    }

    /// **auto-lock-after-first-guest**: admit a non-owner into the ledger.
    /// The first guest ever locks the room in the same mutation; later guests
    /// (after the owner reopens) do not re-trigger the rule. Returns whether
    /// auto-lock fired.
    ///
    /// Callers must have already rejected non-members of locked rooms; this
    /// method only records the admission.
    pub fn admit_guest(&mut self, entrant: ParticipantId) -> bool {
        debug_assert!(self.owner != Some(entrant), "owners are admitted via claim_first_entrant");

        let first_guest = self.guest_count() == 0;
        self.allowed.insert(entrant);

        if first_guest {
            self.locked = true;
        }
        debug_assert!(self.invariants_hold());
        first_guest
    }

    /// Owner-only lock toggle. Returns the new `locked` state.
    ///
    /// Fails `Closed` on a closed room (terminal phase) and `Unauthorized`
    /// for anyone but the owner, so a rejection is distinguishable from a no-op.
    pub fn toggle_lock(&mut self, caller: ParticipantId) -> Result<bool, RoomError> {
        if self.closed {
            return Err(RoomError::Closed);
        }
        self.ensure_owner(caller, "toggle the room lock")?;

        self.locked = !self.locked;
        debug_assert!(self.invariants_hold());
        Ok(self.locked)
    }

    /// Owner-only terminal close: sets `closed` and `locked` together.
    ///
    /// Idempotent for the owner; no operation ever clears `closed`.
    pub fn close_forever(&mut self, caller: ParticipantId) -> Result<(), RoomError> {
        self.ensure_owner(caller, "close the room")?;

        self.closed = true;
        self.locked = true;
        debug_assert!(self.invariants_hold());
        Ok(())
    }

    /// Guard for message/typing write paths: expired reads as `Expired`,
    /// closed as `Closed`.
    pub fn ensure_writable(&self, now_ms: u64) -> Result<(), RoomError> {
        if self.is_expired(now_ms) {
            return Err(RoomError::Expired);
        }
        if self.closed {
            return Err(RoomError::Closed);
        }
        Ok(())
    }

    /// Structural invariants: `closed ⇒ locked`, and a set owner is in the
    /// ledger. Checked by `debug_assert` after every mutation and by the
    /// fuzzer.
    pub fn invariants_hold(&self) -> bool {
        let closed_implies_locked = !self.closed || self.locked;
        let owner_admitted = self.owner.is_none_or(|owner| self.allowed.contains(&owner));
        closed_implies_locked && owner_admitted
    }

    fn ensure_owner(
        &self,
        caller: ParticipantId,
        action: &'static str,
    ) -> Result<(), RoomError> {
        if self.owner == Some(caller) {
            Ok(())
        } else {
            Err(RoomError::Unauthorized { participant: caller, action })
        }
    }
}

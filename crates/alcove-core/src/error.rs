//! Room operation errors: the user-facing taxonomy.
//!
//! Admission rejections, lifecycle refusals, and store failures all surface
//! through [`RoomError`]. `AlreadyMember` is deliberately *not* here: it is a
//! successful admission outcome (see [`crate::admission::Admission`]), not a
//! failure.

use thiserror::Error;

use crate::{
    ident::{MessageId, ParticipantId, RoomCode},
    store::StoreError,
};

/// Errors from room operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// No room exists under this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room is locked against new admissions.
    #[error("room is locked")]
    Locked,

    /// The room was closed forever by its owner. Terminal for the room;
    /// rejects everyone, members included. History stays readable.
    #[error("room is closed")]
    Closed,

    /// All seats are taken by currently active members.
    #[error("room is full")]
    Full,

    /// The room's TTL has passed. Write paths treat this like a close, but
    /// surface the more specific signal.
    #[error("room has expired")]
    Expired,

    /// The caller may not perform this operation. Always surfaced, never a
    /// silent no-op, so callers can distinguish "did nothing" from "was not
    /// allowed to".
    #[error("participant {participant} may not {action}")]
    Unauthorized {
        /// Who attempted the operation.
        participant: ParticipantId,
        /// What they attempted, in imperative form.
        action: &'static str,
    },

    /// No message with this id in the room.
    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    /// Text messages must contain something after trimming.
    #[error("message body is empty")]
    EmptyMessage,

    /// Store contention outlasted the bounded retry schedule. Terminal; the
    /// individual conflicts were transient but the operation gave up.
    #[error("store contention persisted after {attempts} attempts")]
    Contended {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// True if retrying against fresh state can succeed.
    ///
    /// Only an individual store conflict qualifies; `Contended` means the
    /// retry budget is already spent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_transient())
    }
}

//! Session-level errors.

use alcove_core::{RoomError, external::ExternalError};
use thiserror::Error;

/// Errors surfaced by a [`RoomSession`](crate::RoomSession).
///
/// Room rejections pass through unchanged so callers can match on the
/// taxonomy (`Locked`, `Closed`, `Full`, ...); collaborator failures
/// (blob store, identity) are wrapped separately because they never
/// invalidate the session itself.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The room engine rejected the operation.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A collaborator service (blob store, identity) failed.
    #[error(transparent)]
    External(#[from] ExternalError),
}

impl SessionError {
    /// True if retrying against fresh state can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Room(err) if err.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use alcove_core::StoreError;

    use super::*;

    #[test]
    fn room_errors_pass_through() {
        let err: SessionError = RoomError::Locked.into();
        assert_eq!(err.to_string(), "room is locked");
        assert!(!err.is_transient());
    }

    #[test]
    fn conflicts_stay_transient_through_the_wrap() {
        let err: SessionError =
            RoomError::Store(StoreError::Conflict { expected: 2, got: 1 }).into();
        assert!(err.is_transient());
    }
}

//! Store error types.

use thiserror::Error;

use crate::ident::{MessageId, RoomCode};

/// Errors from store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Conditional room update lost a race.
    ///
    /// `expected` is the revision currently stored; `got` is the revision the
    /// caller based its write on. Transient: re-read and retry with backoff,
    /// bounded by the caller's [`RetryPolicy`](crate::config::RetryPolicy).
    #[error("revision conflict: store at {expected}, write based on {got}")]
    Conflict {
        /// Revision currently stored.
        expected: u64,
        /// Revision the rejected write was based on.
        got: u64,
    },

    /// Room creation hit an existing room code.
    ///
    /// Codes are random; the caller regenerates and retries creation.
    #[error("room {0} already exists")]
    AlreadyExists(RoomCode),

    /// No room document under this code.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// No message with this id in the room.
    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    /// Stored bytes could not be encoded or decoded. Terminal; indicates
    /// corruption or a version mismatch.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Backend I/O failure. Terminal for the operation.
    #[error("io: {0}")]
    Io(String),
}

impl StoreError {
    /// True if retrying the same operation against fresh state can succeed.
    ///
    /// Only revision conflicts qualify; everything else is terminal per the
    /// error taxonomy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

//! Identifier newtypes: room codes, participant ids, message ids.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::env::Environment;

/// A shareable 6-character invite code identifying a room.
///
/// Codes are uppercase base-36 (`0-9A-Z`), generated client-side from
/// environment randomness. Parsing normalizes lowercase input so codes can be
/// read back over a phone call.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode([u8; RoomCode::LEN]);

/// Characters a room code may contain.
const CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

impl RoomCode {
    /// Fixed code length.
    pub const LEN: usize = 6;

    /// Generate a fresh code from environment randomness.
    ///
    /// Collisions are possible (36^6 codes) and handled at room creation by
    /// regenerating, not here.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut raw = [0u8; Self::LEN];
        env.random_bytes(&mut raw);

        let mut code = [0u8; Self::LEN];
        for (dst, byte) in code.iter_mut().zip(raw) {
            *dst = CODE_ALPHABET[byte as usize % CODE_ALPHABET.len()];
        }
        Self(code)
    }

    /// The code as an ASCII string slice.
    pub fn as_str(&self) -> &str {
        // Invariant: constructed only from CODE_ALPHABET bytes.
        #[allow(clippy::expect_used)]
        std::str::from_utf8(&self.0).expect("invariant: room codes are ASCII")
    }

    /// The raw code bytes, for building composite store keys.
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomCode({})", self.as_str())
    }
}

/// Errors from parsing a room code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomCodeError {
    /// Input was not exactly [`RoomCode::LEN`] characters.
    #[error("room code must be {len} characters, got {0}", len = RoomCode::LEN)]
    InvalidLength(usize),

    /// Input contained a character outside `0-9A-Z`.
    #[error("invalid character {0:?} in room code")]
    InvalidChar(char),
}

impl FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.chars().count() != Self::LEN {
            return Err(RoomCodeError::InvalidLength(trimmed.chars().count()));
        }

        let mut code = [0u8; Self::LEN];
        for (dst, ch) in code.iter_mut().zip(trimmed.chars()) {
            let upper = ch.to_ascii_uppercase();
            if !upper.is_ascii_alphanumeric() {
                return Err(RoomCodeError::InvalidChar(ch));
            }
            *dst = upper as u8;
        }
        Ok(Self(code))
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.as_str().to_string()
    }
}

/// Stable pseudonymous participant identity.
///
/// Provisioned anonymously as a random 128-bit value on first use; the
/// embedding application keeps it stable across sessions. Not a secret, but
/// unguessable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParticipantId(pub u128);

impl ParticipantId {
    /// Provision a fresh random identity.
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self(env.random_u128())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Store-assigned message identity, a per-room sequence number.
///
/// Monotonically increasing within a room, which makes it the tiebreak for
/// message ordering under equal timestamps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a blob (voice note payload) held by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef(pub String);

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Core engines for ephemeral code-gated chat rooms.
//!
//! A room is created with a short invite code, admits a bounded number of
//! participants, and locks itself after the first guest joins (single-use
//! invite). There is no authoritative server process: every client runs the
//! same engines and coordinates exclusively through conditional writes to, and
//! change feeds from, a shared document store.
//!
//! # Architecture
//!
//! The crate is Sans-IO: engines take an [`env::Environment`] for time and
//! randomness and a [`store::Store`] for state, perform one synchronous
//! evaluation, and return a result. Retry loops and timers belong to the
//! caller (see `alcove-client`).
//!
//! # Components
//!
//! - [`admission`]: the single-pass entry decision, applied as one revision
//!   CAS on the room document
//! - [`lifecycle`]: owner-gated lock/close transitions and room creation
//! - [`message`]: append, tombstone, and read-receipt operations
//! - [`presence`] / [`typing`]: heartbeat records and ephemeral typing
//!   signals
//! - [`store`]: the document store contract, including change feeds

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod admission;
pub mod config;
pub mod env;
pub mod error;
pub mod external;
pub mod ident;
pub mod lifecycle;
pub mod message;
pub mod presence;
pub mod room;
pub mod store;
pub mod typing;

pub use admission::{Admission, EntrantRole};
pub use config::{RetryPolicy, RoomConfig};
pub use env::Environment;
pub use error::RoomError;
pub use ident::{MediaRef, MessageId, ParticipantId, RoomCode};
pub use room::{RoomDoc, RoomPhase};
pub use store::{Store, StoreError};

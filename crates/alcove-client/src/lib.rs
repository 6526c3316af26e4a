//! Async session layer for alcove rooms.
//!
//! [`alcove_core`] keeps the engines Sans-IO; this crate supplies the
//! runtime around them. A [`RoomSession`] joins a room (retrying lost
//! admission races with backoff), keeps the member's presence alive on
//! a heartbeat task, merges the store's change feeds into a single
//! stream of [`SessionEvent`]s, and tears all of that down on leave or
//! drop so a departed participant never holds a capacity seat through
//! a leaked timer.
//!
//! Collaborator implementations live here too: anonymous identity
//! provisioning, an in-memory blob store, and the injected
//! [`PlayerSession`] that owns exclusive voice playback.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod identity;
mod location;
mod media;
mod session;

pub use error::SessionError;
pub use identity::AnonymousIdentity;
pub use location::FixedGeolocator;
pub use media::{MemoryBlobStore, PlaybackBackend, PlayerSession};
pub use session::{RoomSession, SessionEvent};

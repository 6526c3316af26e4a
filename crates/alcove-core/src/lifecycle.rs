//! Room creation, lock toggling, permanent closure, and expiry sweeps.
//!
//! Lifecycle transitions go through the same revision-checked update as
//! admission, so an owner toggling the lock can never clobber a
//! concurrent admission's auto-lock, and vice versa.

use tracing::{debug, info};

use crate::{
    config::{RetryPolicy, RoomConfig},
    env::Environment,
    error::RoomError,
    ident::{ParticipantId, RoomCode},
    room::RoomDoc,
    store::{Store, StoreError},
};

/// Attempt budget for regenerating a colliding room code.
const CODE_ATTEMPTS: u32 = 8;

/// Creates a room under a freshly generated code and returns the code.
///
/// The creator is not yet the owner: ownership goes to the first
/// participant admitted, which is normally the creator entering their
/// own room moments later. A generated code that is already taken is
/// regenerated; the space is large enough that running out of attempts
/// means the random source is broken, and the collision error is
/// surfaced as-is in that case.
pub fn create_room<S: Store, E: Environment>(
    store: &S,
    env: &E,
    config: &RoomConfig,
) -> Result<RoomCode, RoomError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let code = RoomCode::generate(env);
        let doc = RoomDoc::new(env.now_ms(), config.room_ttl);
        match store.create_room(code, &doc) {
            Ok(_) => {
                info!(room = %code, expires_at_ms = doc.expires_at_ms, "room created");
                return Ok(code);
            }
            Err(err @ StoreError::AlreadyExists(_)) => {
                if attempts >= CODE_ATTEMPTS {
                    return Err(err.into());
                }
                debug!(room = %code, "room code collision, regenerating");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Toggles the room's lock on behalf of `caller` and returns the new
/// locked state.
///
/// Owner-only. Fails with [`RoomError::Closed`] on a closed room and
/// [`RoomError::Expired`] past the TTL; a lock is only meaningful while
/// admissions are still possible.
pub fn toggle_lock<S: Store, E: Environment>(
    store: &S,
    env: &E,
    policy: &RetryPolicy,
    code: RoomCode,
    caller: ParticipantId,
) -> Result<bool, RoomError> {
    policy.run(|| {
        let versioned = store.room(code)?.ok_or(RoomError::NotFound(code))?;
        let mut doc = versioned.doc;
        doc.ensure_writable(env.now_ms())?;
        let locked = doc.toggle_lock(caller)?;
        store.update_room(code, versioned.revision, &doc)?;
        info!(room = %code, locked, "lock toggled");
        Ok(locked)
    })
}

/// Closes the room permanently on behalf of `caller`.
///
/// Owner-only and terminal: the room also locks and never reopens.
/// Calling it again on an already-closed room is a silent success for
/// the owner, while a non-owner gets [`RoomError::Unauthorized`] either
/// way. Past the TTL the room is already dead and the transition fails
/// with [`RoomError::Expired`], like every other lifecycle write.
pub fn close_forever<S: Store, E: Environment>(
    store: &S,
    env: &E,
    policy: &RetryPolicy,
    code: RoomCode,
    caller: ParticipantId,
) -> Result<(), RoomError> {
    policy.run(|| {
        let versioned = store.room(code)?.ok_or(RoomError::NotFound(code))?;
        let mut doc = versioned.doc;
        if doc.is_expired(env.now_ms()) {
            return Err(RoomError::Expired);
        }
        let was_closed = doc.closed;
        doc.close_forever(caller)?;
        if was_closed {
            return Ok(());
        }
        store.update_room(code, versioned.revision, &doc)?;
        info!(room = %code, "room closed forever");
        Ok(())
    })
}

/// Deletes every room whose TTL has elapsed and returns their codes.
///
/// Expiry is already enforced on every write path, so the sweep is pure
/// housekeeping and can run on any schedule, including never.
pub fn purge_expired<S: Store, E: Environment>(
    store: &S,
    env: &E,
) -> Result<Vec<RoomCode>, RoomError> {
    let purged = store.purge_expired(env.now_ms())?;
    if !purged.is_empty() {
        info!(count = purged.len(), "purged expired rooms");
    }
    Ok(purged)
}

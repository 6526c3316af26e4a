//! Anonymous identity provisioning.

use std::sync::OnceLock;

use alcove_core::{
    Environment, ParticipantId,
    external::{ExternalError, Identity},
};
use async_trait::async_trait;
use tracing::info;

/// Identity provider that provisions a random participant id on first
/// use and then keeps handing out the same one.
///
/// The id is a random 128-bit value: pseudonymous, unguessable, and
/// stable for the lifetime of this provider. Embedding applications
/// that want the id to survive restarts persist it themselves and
/// rebuild the provider with [`AnonymousIdentity::with_id`].
pub struct AnonymousIdentity<E> {
    env: E,
    id: OnceLock<ParticipantId>,
}

impl<E: Environment> AnonymousIdentity<E> {
    /// A provider that will provision lazily from `env`.
    pub fn new(env: E) -> Self {
        Self { env, id: OnceLock::new() }
    }

    /// A provider restored from a persisted id.
    pub fn with_id(env: E, id: ParticipantId) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(id);
        Self { env, id: cell }
    }
}

#[async_trait]
impl<E: Environment> Identity for AnonymousIdentity<E> {
    async fn participant(&self) -> Result<ParticipantId, ExternalError> {
        Ok(*self.id.get_or_init(|| {
            let id = ParticipantId::generate(&self.env);
            info!(participant = %id, "anonymous identity provisioned");
            id
        }))
    }
}

#[cfg(test)]
mod tests {
    use alcove_harness::SimEnv;

    use super::*;

    #[tokio::test]
    async fn provisions_once_and_stays_stable() {
        let identity = AnonymousIdentity::new(SimEnv::new(3));

        let first = identity.participant().await.unwrap();
        let second = identity.participant().await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, ParticipantId(0));
    }

    #[tokio::test]
    async fn restored_identity_keeps_the_persisted_id() {
        let persisted = ParticipantId(0xDEAD_BEEF);
        let identity = AnonymousIdentity::with_id(SimEnv::new(4), persisted);

        assert_eq!(identity.participant().await.unwrap(), persisted);
    }

    #[tokio::test]
    async fn distinct_providers_get_distinct_ids() {
        let a = AnonymousIdentity::new(SimEnv::new(5));
        let b = AnonymousIdentity::new(SimEnv::new(6));

        assert_ne!(a.participant().await.unwrap(), b.participant().await.unwrap());
    }
}

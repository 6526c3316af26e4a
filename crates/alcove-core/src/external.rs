//! Integration seams for the services the room engine does not own.
//!
//! Blob storage, geolocation, and identity issuance are thin I/O
//! concerns: the engine stores references and ids, never bytes or
//! coordinates. Implementations live with the embedding application;
//! the in-memory ones used by tests and the simulator live in the
//! client crate.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::ident::{MediaRef, ParticipantId};

/// Failure from a collaborator service.
#[derive(Debug, Error)]
pub enum ExternalError {
    /// The referenced blob does not exist.
    #[error("no blob stored at {0}")]
    BlobMissing(MediaRef),
    /// The service refused or could not complete the call.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Storage for voice clips and other media referenced from messages.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores a blob and returns the reference to embed in a message.
    async fn put(&self, bytes: Bytes) -> Result<MediaRef, ExternalError>;

    /// Fetches a previously stored blob.
    async fn get(&self, media: &MediaRef) -> Result<Bytes, ExternalError>;
}

/// Issues the stable participant id for this device.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Returns the device's participant id, provisioning an anonymous
    /// one on first use.
    async fn participant(&self) -> Result<ParticipantId, ExternalError>;
}

/// Coarse device position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Degrees north of the equator.
    pub latitude: f64,
    /// Degrees east of the prime meridian.
    pub longitude: f64,
}

/// Looks up where the device currently is.
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Returns the current position, if the platform permits.
    async fn current_position(&self) -> Result<Position, ExternalError>;
}

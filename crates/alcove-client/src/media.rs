//! Voice note storage and playback.
//!
//! Playback state is owned by an explicit [`PlayerSession`] object the
//! UI layer constructs and injects wherever a voice message renders,
//! rather than an ambient global. The session enforces exclusive
//! playback: starting a clip stops whichever clip was playing.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use alcove_core::{
    MediaRef,
    external::{BlobStore, ExternalError},
};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

/// In-memory blob store for tests and the simulator.
///
/// References are `mem/{n}` with a process-local counter; clones do
/// not share state, so hand out references to one instance instead.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    next: AtomicU64,
}

impl MemoryBlobStore {
    /// An empty blob store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<MediaRef, ExternalError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let media = MediaRef(format!("mem/{n}"));
        self.blobs.lock().await.insert(media.0.clone(), bytes);
        Ok(media)
    }

    async fn get(&self, media: &MediaRef) -> Result<Bytes, ExternalError> {
        self.blobs
            .lock()
            .await
            .get(&media.0)
            .cloned()
            .ok_or_else(|| ExternalError::BlobMissing(media.clone()))
    }
}

/// Platform audio hooks the player session drives.
///
/// Implementations wrap whatever the platform plays sound with; the
/// session only tells them when to start and stop.
pub trait PlaybackBackend: Send {
    /// Begin playing a fetched clip.
    fn start(&mut self, media: &MediaRef, clip: Bytes);

    /// Stop the clip if it is still playing.
    fn stop(&mut self, media: &MediaRef);
}

/// Exclusive voice playback session.
///
/// At most one clip plays at a time: [`play`](Self::play) stops the
/// current clip before fetching and starting the next, and
/// [`stop`](Self::stop) silences the session. Dropping the session
/// also stops playback.
pub struct PlayerSession<B: PlaybackBackend> {
    backend: B,
    playing: Option<MediaRef>,
}

impl<B: PlaybackBackend> PlayerSession<B> {
    /// A silent session over the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend, playing: None }
    }

    /// Fetches `media` from the blob store and plays it, stopping any
    /// clip already playing.
    ///
    /// A fetch failure leaves the session silent rather than keeping
    /// the previous clip going under a stale "now playing" state.
    pub async fn play<S: BlobStore + ?Sized>(
        &mut self,
        blobs: &S,
        media: MediaRef,
    ) -> Result<(), ExternalError> {
        self.stop();
        let clip = blobs.get(&media).await?;
        self.backend.start(&media, clip);
        self.playing = Some(media);
        Ok(())
    }

    /// Stops the current clip, if any.
    pub fn stop(&mut self) {
        if let Some(media) = self.playing.take() {
            self.backend.stop(&media);
        }
    }

    /// The clip currently playing.
    pub fn playing(&self) -> Option<&MediaRef> {
        self.playing.as_ref()
    }
}

impl<B: PlaybackBackend> Drop for PlayerSession<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_types, reason = "Synchronous log behind a test-only std lock")]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    /// Backend that records start/stop calls.
    #[derive(Clone, Default)]
    struct RecordingBackend {
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl RecordingBackend {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl PlaybackBackend for RecordingBackend {
        fn start(&mut self, media: &MediaRef, _clip: Bytes) {
            self.log.lock().unwrap().push(format!("start {media}"));
        }

        fn stop(&mut self, media: &MediaRef) {
            self.log.lock().unwrap().push(format!("stop {media}"));
        }
    }

    #[tokio::test]
    async fn blobs_round_trip() {
        let blobs = MemoryBlobStore::new();

        let media = blobs.put(Bytes::from_static(b"clip")).await.unwrap();
        assert_eq!(blobs.get(&media).await.unwrap(), Bytes::from_static(b"clip"));
    }

    #[tokio::test]
    async fn missing_blob_is_reported() {
        let blobs = MemoryBlobStore::new();
        let err = blobs.get(&MediaRef("mem/404".to_owned())).await.unwrap_err();
        assert!(matches!(err, ExternalError::BlobMissing(_)));
    }

    #[tokio::test]
    async fn playback_is_exclusive() {
        let blobs = MemoryBlobStore::new();
        let first = blobs.put(Bytes::from_static(b"one")).await.unwrap();
        let second = blobs.put(Bytes::from_static(b"two")).await.unwrap();

        let backend = RecordingBackend::default();
        let mut player = PlayerSession::new(backend.clone());

        player.play(&blobs, first.clone()).await.unwrap();
        player.play(&blobs, second.clone()).await.unwrap();
        assert_eq!(player.playing(), Some(&second));

        assert_eq!(
            backend.log(),
            vec![format!("start {first}"), format!("stop {first}"), format!("start {second}")]
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_session_silent() {
        let blobs = MemoryBlobStore::new();
        let real = blobs.put(Bytes::from_static(b"one")).await.unwrap();

        let mut player = PlayerSession::new(RecordingBackend::default());
        player.play(&blobs, real).await.unwrap();

        let missing = MediaRef("mem/404".to_owned());
        assert!(player.play(&blobs, missing).await.is_err());
        assert_eq!(player.playing(), None);
    }

    #[tokio::test]
    async fn drop_stops_playback() {
        let blobs = MemoryBlobStore::new();
        let media = blobs.put(Bytes::from_static(b"one")).await.unwrap();

        let backend = RecordingBackend::default();
        {
            let mut player = PlayerSession::new(backend.clone());
            player.play(&blobs, media.clone()).await.unwrap();
        }
        assert_eq!(backend.log(), vec![format!("start {media}"), format!("stop {media}")]);
    }
}

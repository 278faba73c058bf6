//! Opaque media handles. Capture, encoding and rendering live outside the mesh;
//! the mesh only moves these handles around and flips track-level flags.

use std::sync::atomic::{AtomicBool, Ordering};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::sync::{Arc, RwLock};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    #[display(fmt = "audio")]
    Audio,
    #[display(fmt = "video")]
    Video,
}

/// A single capturable track. Clones share the same underlying track.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    ended: AtomicBool,
    ended_notify: Notify,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
                ended_notify: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }

    /// Stops the track. Anyone waiting on [`MediaTrack::ended`] is woken.
    pub fn stop(&self) {
        if !self.inner.ended.swap(true, Ordering::SeqCst) {
            self.inner.ended_notify.notify_waiters();
        }
    }

    /// Resolves once the track has ended, either by [`MediaTrack::stop`] or
    /// because the capture source went away.
    pub async fn ended(&self) {
        loop {
            let notified = self.inner.ended_notify.notified();
            if self.is_ended() {
                return;
            }
            notified.await;
        }
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Render handle for a stream, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaStream {
    id: Uuid,
}

impl MediaStream {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn from_id(id: Uuid) -> Self {
        Self { id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

/// The node's own capture stream. There is exactly one per call; every
/// outgoing media link reads from it, so clones share the track set.
#[derive(Clone)]
pub struct LocalStream {
    id: Uuid,
    tracks: Arc<RwLock<Vec<MediaTrack>>>,
}

impl LocalStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks: Arc::new(RwLock::new(tracks)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> MediaStream {
        MediaStream::from_id(self.id)
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.read().clone()
    }

    pub fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.tracks
            .read()
            .iter()
            .filter(|track| track.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn video_track(&self) -> Option<MediaTrack> {
        self.tracks_of(TrackKind::Video).into_iter().next()
    }

    /// Flips the enabled flag on every track of `kind`.
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks.read().iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
    }

    /// Swaps the outgoing video track, leaving audio untouched. Returns the
    /// tracks that were removed.
    pub fn replace_video_track(&self, track: MediaTrack) -> Vec<MediaTrack> {
        let mut tracks = self.tracks.write();
        let (removed, mut kept): (Vec<_>, Vec<_>) = tracks
            .drain(..)
            .partition(|t| t.kind() == TrackKind::Video);
        kept.push(track);
        *tracks = kept;
        removed
    }

    pub fn stop_all(&self) {
        for track in self.tracks.read().iter() {
            track.stop();
        }
    }
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream")
            .field("id", &self.id)
            .field("tracks", &*self.tracks.read())
            .finish()
    }
}

//! Local capture state. The node has one [`LocalStream`]; every outgoing media
//! link reads from it, so toggles are applied to that single stream and track
//! substitutions are pushed to each open media link afterwards.

use async_trait::async_trait;
use huddle::{
    call::{
        media::{LocalStream, MediaTrack, TrackKind},
        LocalMediaState,
    },
    error::Error,
};
use uuid::Uuid;

use crate::links::LinkManager;

/// Platform capture. Each call may suspend while the user is prompted.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// microphone and camera
    async fn user_media(&self) -> Result<LocalStream, Error>;
    async fn display_media(&self) -> Result<MediaTrack, Error>;
    /// a fresh camera track, used to come back from screen sharing
    async fn camera_track(&self) -> Result<MediaTrack, Error>;
}

pub struct LocalMedia {
    stream: Option<LocalStream>,
    screen: Option<MediaTrack>,
    state: LocalMediaState,
}

impl LocalMedia {
    pub fn new(stream: Option<LocalStream>) -> Self {
        let state = LocalMediaState {
            muted: false,
            video_on: true,
            screen_sharing: false,
            visible: true,
            has_media: stream.is_some(),
        };
        Self {
            stream,
            screen: None,
            state,
        }
    }

    pub fn stream(&self) -> Option<&LocalStream> {
        self.stream.as_ref()
    }

    pub fn state(&self) -> LocalMediaState {
        self.state
    }

    pub fn screen_track_id(&self) -> Option<Uuid> {
        self.screen.as_ref().map(|t| t.id())
    }

    fn require_stream(&self) -> Result<&LocalStream, Error> {
        self.stream
            .as_ref()
            .ok_or_else(|| Error::MediaUnavailable("no local stream".into()))
    }

    /// returns true if now muted
    pub fn toggle_mute(&mut self) -> Result<bool, Error> {
        let stream = self.require_stream()?;
        let muted = !self.state.muted;
        stream.set_enabled(TrackKind::Audio, !muted);
        self.state.muted = muted;
        Ok(muted)
    }

    /// returns true if video is now on
    pub fn toggle_video(&mut self) -> Result<bool, Error> {
        self.require_stream()?;
        self.state.video_on = !self.state.video_on;
        self.apply_video();
        Ok(self.state.video_on)
    }

    /// Hidden nodes stop sending video. `video_on` is left alone so the
    /// previous choice comes back with visibility.
    pub fn set_visibility(&mut self, visible: bool) {
        self.state.visible = visible;
        self.apply_video();
    }

    fn apply_video(&self) {
        if let Some(stream) = &self.stream {
            stream.set_enabled(TrackKind::Video, self.state.video_on && self.state.visible);
        }
    }

    /// Puts `track` in place of the camera. The caller propagates it to the
    /// media links.
    pub fn begin_screen_share(&mut self, track: MediaTrack) -> Result<(), Error> {
        if self.state.screen_sharing {
            return Err(Error::ScreenShareActive);
        }
        let stream = self.require_stream()?;
        for camera in stream.replace_video_track(track.clone()) {
            camera.stop();
        }
        self.screen = Some(track);
        self.state.screen_sharing = true;
        self.apply_video();
        Ok(())
    }

    /// Stops the screen track and restores `camera`. Without a camera the
    /// ended screen track stays in place and no video is sent. Returns the
    /// track now carried as video, if any.
    pub fn end_screen_share(&mut self, camera: Option<MediaTrack>) -> Result<Option<MediaTrack>, Error> {
        if !self.state.screen_sharing {
            return Err(Error::ScreenShareInactive);
        }
        if let Some(screen) = self.screen.take() {
            screen.stop();
        }
        self.state.screen_sharing = false;
        let stream = self.require_stream()?;
        let camera = match camera {
            Some(camera) => camera,
            None => return Ok(None),
        };
        stream.replace_video_track(camera.clone());
        self.apply_video();
        Ok(Some(camera))
    }

    pub fn stop_all(&mut self) {
        if let Some(screen) = self.screen.take() {
            screen.stop();
        }
        if let Some(stream) = &self.stream {
            stream.stop_all();
        }
        self.state.screen_sharing = false;
    }
}

/// Re-publishes `track` as the outgoing video of every open media link.
/// Returns how many links took it.
pub fn propagate_video(links: &LinkManager, track: &MediaTrack) -> usize {
    links
        .media_links()
        .into_iter()
        .filter(|(link, remote)| match links.replace_video_track(*link, track) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("failed to replace video track toward {remote}: {e}");
                false
            }
        })
        .count()
}

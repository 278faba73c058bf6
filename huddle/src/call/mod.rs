//! Calls provide multi-party audio/video over a peer-to-peer mesh. An implementation should handle:
//! - finding the host of a call and registering its own mesh address
//! - bringing up one data link and one media link to every other participant
//! - keeping a per-node directory of who is in the call
//! - chat over the data links
//! - local mute/video/screen share toggles
//!
use async_trait::async_trait;
use derive_more::Display;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Error;

mod call_config;
pub mod media;
mod participant;
mod peer_id;

pub use call_config::CallConfig;
pub use participant::{
    LocalMediaState, ParticipantRecord, ParticipantSummary, LOCAL_ID, UNKNOWN_ORIGIN,
};
pub use peer_id::PeerId;

/// Provides mesh call capabilities
#[async_trait]
pub trait Call: Send + Sync {
    // ------ Misc ------
    /// The event stream notifies the presentation layer of call related events
    async fn get_event_stream(&mut self) -> Result<CallEventStream, Error>;

    /// This node's mesh address
    async fn own_address(&self) -> Result<PeerId, Error>;

    /// Outcome of registering with the transport
    async fn rendezvous_status(&self) -> Result<RendezvousStatus, Error>;

    // ------ Membership ------

    /// Every record in the directory, in insertion order. The first one is the
    /// local record.
    async fn participants(&self) -> Result<Vec<ParticipantRecord>, Error>;

    // ------ Messaging ------

    /// Broadcast a chat line to every connected participant. The line is also
    /// echoed to the local event stream.
    async fn send_chat(&mut self, text: &str) -> Result<(), Error>;

    // ------ Media controls ------

    async fn local_state(&self) -> Result<LocalMediaState, Error>;
    /// returns true if now muted
    async fn toggle_mute(&mut self) -> Result<bool, Error>;
    /// returns true if video is now on
    async fn toggle_video(&mut self) -> Result<bool, Error>;
    async fn start_screen_share(&mut self) -> Result<(), Error>;
    async fn stop_screen_share(&mut self) -> Result<(), Error>;
    /// returns true if screen sharing is now active
    async fn toggle_screen_share(&mut self) -> Result<bool, Error>;
    /// pauses outgoing video while the node is not visible
    async fn set_visibility(&mut self, visible: bool) -> Result<(), Error>;

    // ------ Teardown ------

    /// end/leave the current call. closes every link and stops local media
    async fn leave_call(&mut self) -> Result<(), Error>;
}

#[derive(Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RendezvousStatus {
    #[display(fmt = "Connecting")]
    Connecting,
    #[display(fmt = "Connected")]
    Connected,
    /// registration timed out. the mesh is skipped but local media works
    #[display(fmt = "Offline")]
    Offline,
    #[display(fmt = "Error: {_0}")]
    Failed(String),
}

impl RendezvousStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, RendezvousStatus::Connected)
    }
}

/// Drives the presentation layer
#[derive(Debug, Clone)]
pub enum CallEventKind {
    /// render participant
    ParticipantAdded { record: ParticipantRecord },
    /// remove participant
    ParticipantRemoved { id: PeerId },
    /// the participant's record changed (name, stream, toggles)
    ParticipantUpdated { id: PeerId },
    /// append a chat line
    ChatMessage {
        sender: String,
        text: String,
        timestamp: String,
    },
    /// the directory changed
    PresenceChanged {
        count: usize,
        ids: Vec<PeerId>,
        origins: Vec<String>,
    },
    RendezvousStatusChanged { status: RendezvousStatus },
    /// capture failed. the call continues or aborts per the caller's policy
    MediaUnavailable { reason: String },
    LocalMediaChanged { state: LocalMediaState },
    CallTerminated,
}

pub struct CallEventStream(pub BoxStream<'static, CallEventKind>);

impl core::ops::Deref for CallEventStream {
    type Target = BoxStream<'static, CallEventKind>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for CallEventStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

//! The substrate the mesh runs on. A transport registers this node's mesh
//! address, opens data and media links to other addresses and reports
//! everything that happens to those links on a single event stream.
//!
//! Link operations return as soon as the attempt is made; whether the link
//! opened, failed or carried a stream arrives later as a [`TransportEvent`].

mod events;
pub mod sim;

use async_trait::async_trait;
use derive_more::Display;
use huddle::{
    call::{
        media::{LocalStream, MediaStream, MediaTrack},
        PeerId,
    },
    error::Error,
};

pub use events::TransportEventStream;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "link-{_0}")]
pub struct LinkId(pub u64);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    #[display(fmt = "data")]
    Data,
    #[display(fmt = "media")]
    Media,
}

#[derive(Debug, Display, Clone)]
pub enum LinkEventKind {
    /// a remote node opened a link toward us
    #[display(fmt = "Incoming")]
    Incoming,
    #[display(fmt = "Open")]
    Open,
    #[display(fmt = "Message")]
    Message(Vec<u8>),
    /// the remote side's media stream is now flowing
    #[display(fmt = "Stream")]
    Stream(MediaStream),
    #[display(fmt = "Closed")]
    Closed,
    #[display(fmt = "Error: {_0}")]
    Error(String),
}

#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub link: LinkId,
    pub remote: PeerId,
    pub source: LinkKind,
    pub kind: LinkEventKind,
}

impl TransportEvent {
    pub fn new(link: LinkId, remote: PeerId, source: LinkKind, kind: LinkEventKind) -> Self {
        Self {
            link,
            remote,
            source,
            kind,
        }
    }
}

impl std::fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} from {}",
            self.source, self.link, self.kind, self.remote
        )
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Claims `address` for this node. Every other operation requires a
    /// successful registration.
    async fn register(&self, address: &PeerId) -> Result<(), Error>;

    fn connect_data(&self, remote: &PeerId) -> Result<LinkId, Error>;

    /// Err(LinkNotOpen) if the link is not open
    fn send(&self, link: LinkId, payload: Vec<u8>) -> Result<(), Error>;

    fn call_media(&self, remote: &PeerId, stream: &LocalStream) -> Result<LinkId, Error>;

    /// Accepts an inbound media link. `None` answers receive-only.
    fn answer_media(&self, link: LinkId, stream: Option<&LocalStream>) -> Result<(), Error>;

    /// Swaps the outgoing video track of a media link without renegotiating it.
    fn replace_video_track(&self, link: LinkId, track: &MediaTrack) -> Result<(), Error>;

    fn close(&self, link: LinkId);

    /// Closes every link and releases the registered address.
    fn shutdown(&self);

    /// Can only be taken once.
    fn event_stream(&self) -> Result<TransportEventStream, Error>;
}

//! In-memory transport. A [`SimNetwork`] routes links between the
//! [`SimTransport`]s created from it, so whole meshes can run inside one
//! process without any real networking.
//!
//! Every link event is queued on the receiving node's channel at the moment
//! the operation is made. Nodes see them in the order they were produced.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use huddle::{
    call::{
        media::{LocalStream, MediaStream, MediaTrack, TrackKind},
        PeerId,
    },
    error::Error,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::{LinkEventKind, LinkId, LinkKind, Transport, TransportEvent, TransportEventStream};
use crate::host_media::MediaDevices;

/// Shared broker. Cloning yields a handle to the same network.
#[derive(Clone, Default)]
pub struct SimNetwork {
    inner: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<PeerId, UnboundedSender<TransportEvent>>,
    links: HashMap<LinkId, SimLink>,
    next_link: u64,
    failing: HashSet<PeerId>,
    hanging: HashSet<PeerId>,
}

struct SimLink {
    kind: LinkKind,
    initiator: PeerId,
    acceptor: PeerId,
    open: bool,
    caller_stream: Option<MediaStream>,
    // outgoing video track per endpoint
    video: HashMap<PeerId, Uuid>,
}

impl SimLink {
    fn other_end(&self, me: &PeerId) -> Option<&PeerId> {
        if *me == self.initiator {
            Some(&self.acceptor)
        } else if *me == self.acceptor {
            Some(&self.initiator)
        } else {
            None
        }
    }
}

impl NetworkState {
    fn next_link_id(&mut self) -> LinkId {
        self.next_link += 1;
        LinkId(self.next_link)
    }

    fn emit(&self, to: &PeerId, event: TransportEvent) {
        if let Some(tx) = self.nodes.get(to) {
            if tx.send(event).is_err() {
                log::trace!("sim node {to} dropped its event channel");
            }
        }
    }

    fn close_link(&mut self, link: LinkId) {
        if let Some(entry) = self.links.remove(&link) {
            for (me, remote) in [
                (&entry.initiator, &entry.acceptor),
                (&entry.acceptor, &entry.initiator),
            ] {
                self.emit(
                    me,
                    TransportEvent::new(link, remote.clone(), entry.kind, LinkEventKind::Closed),
                );
            }
        }
    }

    fn close_node(&mut self, address: &PeerId) {
        // the departing node gets no events of its own teardown
        self.nodes.remove(address);
        let links: Vec<LinkId> = self
            .links
            .iter()
            .filter(|(_, l)| l.initiator == *address || l.acceptor == *address)
            .map(|(id, _)| *id)
            .collect();
        for link in links {
            self.close_link(link);
        }
    }
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> SimTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        SimTransport {
            network: self.clone(),
            address: Mutex::new(None),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Registration of `address` will fail with an error.
    pub fn fail_registration(&self, address: impl Into<PeerId>) {
        self.inner.lock().failing.insert(address.into());
    }

    /// Registration of `address` will never complete.
    pub fn hang_registration(&self, address: impl Into<PeerId>) {
        self.inner.lock().hanging.insert(address.into());
    }

    /// Drops a node off the network without it running its own teardown.
    /// Every remote end of its links observes a close.
    pub fn crash(&self, address: &PeerId) {
        log::debug!("sim: crashing {address}");
        self.inner.lock().close_node(address);
    }

    pub fn is_registered(&self, address: &PeerId) -> bool {
        self.inner.lock().nodes.contains_key(address)
    }

    /// Number of live links of `kind` across the whole network. Media links
    /// count once answered.
    pub fn link_count(&self, kind: LinkKind) -> usize {
        self.inner
            .lock()
            .links
            .values()
            .filter(|l| l.kind == kind && l.open)
            .count()
    }

    /// Live links of `kind` touching `address`, keyed by the remote end.
    pub fn links_of(&self, address: &PeerId, kind: LinkKind) -> Vec<(LinkId, PeerId)> {
        let state = self.inner.lock();
        let mut links: Vec<_> = state
            .links
            .iter()
            .filter(|(_, l)| l.kind == kind && l.open)
            .filter_map(|(id, l)| l.other_end(address).map(|r| (*id, r.clone())))
            .collect();
        links.sort();
        links
    }

    /// Track id `from` currently sends as video on `link`.
    pub fn outgoing_video(&self, link: LinkId, from: &PeerId) -> Option<Uuid> {
        self.inner
            .lock()
            .links
            .get(&link)
            .and_then(|l| l.video.get(from).copied())
    }
}

pub struct SimTransport {
    network: SimNetwork,
    address: Mutex<Option<PeerId>>,
    tx: UnboundedSender<TransportEvent>,
    rx: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
}

impl SimTransport {
    pub fn address(&self) -> Option<PeerId> {
        self.address.lock().clone()
    }

    /// Pops the next queued event without waiting. Returns `None` once the
    /// event stream has been taken.
    pub fn try_next_event(&self) -> Option<TransportEvent> {
        self.rx.lock().as_mut().and_then(|rx| rx.try_recv().ok())
    }

    fn own(&self) -> Result<PeerId, Error> {
        self.address.lock().clone().ok_or(Error::MeshOffline)
    }

    fn dial(&self, remote: &PeerId, kind: LinkKind, stream: Option<&LocalStream>) -> Result<LinkId, Error> {
        let own = self.own()?;
        if *remote == own {
            return Err(Error::SelfConnect);
        }
        let mut state = self.network.inner.lock();
        let link = state.next_link_id();
        if !state.nodes.contains_key(remote) {
            state.emit(
                &own,
                TransportEvent::new(
                    link,
                    remote.clone(),
                    kind,
                    LinkEventKind::Error(Error::PeerUnavailable(remote.clone()).to_string()),
                ),
            );
            return Ok(link);
        }

        let mut video = HashMap::new();
        if let Some(track) = stream.and_then(|s| s.video_track()) {
            video.insert(own.clone(), track.id());
        }
        state.links.insert(
            link,
            SimLink {
                kind,
                initiator: own.clone(),
                acceptor: remote.clone(),
                open: kind == LinkKind::Data,
                caller_stream: stream.map(|s| s.handle()),
                video,
            },
        );

        state.emit(
            remote,
            TransportEvent::new(link, own.clone(), kind, LinkEventKind::Incoming),
        );
        if kind == LinkKind::Data {
            state.emit(
                remote,
                TransportEvent::new(link, own.clone(), kind, LinkEventKind::Open),
            );
            state.emit(
                &own,
                TransportEvent::new(link, remote.clone(), kind, LinkEventKind::Open),
            );
        }
        Ok(link)
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn register(&self, address: &PeerId) -> Result<(), Error> {
        let hang = {
            let mut state = self.network.inner.lock();
            if state.failing.contains(address) {
                return Err(Error::RendezvousFailed(format!(
                    "registration of {address} refused"
                )));
            }
            if state.hanging.contains(address) {
                true
            } else {
                if state.nodes.contains_key(address) {
                    return Err(Error::AddressUnavailable(address.clone()));
                }
                state.nodes.insert(address.clone(), self.tx.clone());
                *self.address.lock() = Some(address.clone());
                false
            }
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    fn connect_data(&self, remote: &PeerId) -> Result<LinkId, Error> {
        self.dial(remote, LinkKind::Data, None)
    }

    fn send(&self, link: LinkId, payload: Vec<u8>) -> Result<(), Error> {
        let own = self.own()?;
        let state = self.network.inner.lock();
        let entry = state.links.get(&link).ok_or(Error::LinkNotFound)?;
        if !entry.open || entry.kind != LinkKind::Data {
            return Err(Error::LinkNotOpen);
        }
        let remote = entry.other_end(&own).ok_or(Error::LinkNotFound)?;
        state.emit(
            remote,
            TransportEvent::new(link, own.clone(), LinkKind::Data, LinkEventKind::Message(payload)),
        );
        Ok(())
    }

    fn call_media(&self, remote: &PeerId, stream: &LocalStream) -> Result<LinkId, Error> {
        self.dial(remote, LinkKind::Media, Some(stream))
    }

    fn answer_media(&self, link: LinkId, stream: Option<&LocalStream>) -> Result<(), Error> {
        let own = self.own()?;
        let mut state = self.network.inner.lock();
        let entry = state.links.get_mut(&link).ok_or(Error::LinkNotFound)?;
        if entry.kind != LinkKind::Media || entry.acceptor != own {
            return Err(Error::LinkNotFound);
        }
        entry.open = true;
        if let Some(track) = stream.and_then(|s| s.video_track()) {
            entry.video.insert(own.clone(), track.id());
        }
        let caller = entry.initiator.clone();
        let caller_stream = entry.caller_stream.clone();

        if let Some(remote_stream) = caller_stream {
            state.emit(
                &own,
                TransportEvent::new(
                    link,
                    caller.clone(),
                    LinkKind::Media,
                    LinkEventKind::Stream(remote_stream),
                ),
            );
        }
        if let Some(stream) = stream {
            state.emit(
                &caller,
                TransportEvent::new(
                    link,
                    own,
                    LinkKind::Media,
                    LinkEventKind::Stream(stream.handle()),
                ),
            );
        }
        Ok(())
    }

    fn replace_video_track(&self, link: LinkId, track: &MediaTrack) -> Result<(), Error> {
        if track.kind() != TrackKind::Video {
            return Err(Error::OtherWithContext(format!(
                "{} is not a video track",
                track.label()
            )));
        }
        let own = self.own()?;
        let mut state = self.network.inner.lock();
        let entry = state.links.get_mut(&link).ok_or(Error::LinkNotFound)?;
        if entry.kind != LinkKind::Media || entry.other_end(&own).is_none() {
            return Err(Error::LinkNotFound);
        }
        entry.video.insert(own, track.id());
        Ok(())
    }

    fn close(&self, link: LinkId) {
        self.network.inner.lock().close_link(link);
    }

    fn shutdown(&self) {
        if let Some(address) = self.address.lock().take() {
            self.network.inner.lock().close_node(&address);
        }
    }

    fn event_stream(&self) -> Result<TransportEventStream, Error> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| Error::OtherWithContext("event stream already taken".into()))?;
        let stream = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };
        Ok(TransportEventStream(Box::pin(stream)))
    }
}

/// Capture devices that always succeed unless told otherwise.
#[derive(Default)]
pub struct SimMediaDevices {
    deny_user_media: AtomicBool,
    deny_display_media: AtomicBool,
    deny_camera: AtomicBool,
    screen: Mutex<Option<MediaTrack>>,
}

impl SimMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_user_media(&self) {
        self.deny_user_media.store(true, Ordering::SeqCst);
    }

    pub fn deny_display_media(&self) {
        self.deny_display_media.store(true, Ordering::SeqCst);
    }

    pub fn deny_camera(&self) {
        self.deny_camera.store(true, Ordering::SeqCst);
    }

    /// Simulates the user ending the capture from outside the call, e.g. by
    /// closing the shared window. Returns false if nothing was being captured.
    pub fn end_screen_capture(&self) -> bool {
        match self.screen.lock().take() {
            Some(track) => {
                track.stop();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MediaDevices for SimMediaDevices {
    async fn user_media(&self) -> Result<LocalStream, Error> {
        if self.deny_user_media.load(Ordering::SeqCst) {
            return Err(Error::MediaUnavailable("permission denied".into()));
        }
        Ok(LocalStream::new(vec![
            MediaTrack::new(TrackKind::Audio, "microphone"),
            MediaTrack::new(TrackKind::Video, "camera"),
        ]))
    }

    async fn display_media(&self) -> Result<MediaTrack, Error> {
        if self.deny_display_media.load(Ordering::SeqCst) {
            return Err(Error::MediaUnavailable("screen capture denied".into()));
        }
        let track = MediaTrack::new(TrackKind::Video, "screen");
        *self.screen.lock() = Some(track.clone());
        Ok(track)
    }

    async fn camera_track(&self) -> Result<MediaTrack, Error> {
        if self.deny_camera.load(Ordering::SeqCst) {
            return Err(Error::MediaUnavailable("camera unavailable".into()));
        }
        Ok(MediaTrack::new(TrackKind::Video, "camera"))
    }
}

//! Per-remote link table. At most one data link and one media link is tracked
//! for each remote address. Transitions reported by the transport are applied
//! here first; a link the table no longer tracks is ignored by the callers.

use std::collections::HashMap;

use derive_more::Display;
use huddle::{
    call::{
        media::{LocalStream, MediaTrack},
        PeerId,
    },
    error::Error,
    sync::Arc,
};

use crate::transport::{LinkId, LinkKind, Transport};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    #[display(fmt = "connecting")]
    Connecting,
    #[display(fmt = "open")]
    Open,
    /// media link with the remote stream flowing
    #[display(fmt = "streaming")]
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedLink {
    pub id: LinkId,
    pub remote: PeerId,
    pub kind: LinkKind,
    pub state: LinkState,
    /// dialed by this node
    pub outbound: bool,
}

pub struct LinkManager {
    own: PeerId,
    transport: Arc<dyn Transport>,
    links: HashMap<LinkId, TrackedLink>,
    data: HashMap<PeerId, LinkId>,
    media: HashMap<PeerId, LinkId>,
}

impl LinkManager {
    pub fn new(own: PeerId, transport: Arc<dyn Transport>) -> Self {
        Self {
            own,
            transport,
            links: HashMap::new(),
            data: HashMap::new(),
            media: HashMap::new(),
        }
    }

    pub fn own(&self) -> &PeerId {
        &self.own
    }

    fn by_kind(&mut self, kind: LinkKind) -> &mut HashMap<PeerId, LinkId> {
        match kind {
            LinkKind::Data => &mut self.data,
            LinkKind::Media => &mut self.media,
        }
    }

    fn track(&mut self, link: LinkId, remote: &PeerId, kind: LinkKind, outbound: bool) {
        self.by_kind(kind).insert(remote.clone(), link);
        self.links.insert(
            link,
            TrackedLink {
                id: link,
                remote: remote.clone(),
                kind,
                state: LinkState::Connecting,
                outbound,
            },
        );
    }

    fn untrack(&mut self, link: LinkId) -> Option<TrackedLink> {
        let entry = self.links.remove(&link)?;
        let map = self.by_kind(entry.kind);
        if map.get(&entry.remote) == Some(&link) {
            map.remove(&entry.remote);
        }
        Some(entry)
    }

    /// Returns the existing data link to `remote` if there is one, otherwise
    /// dials. Dialing ourselves is a no-op.
    pub fn connect_data(&mut self, remote: &PeerId) -> Result<Option<LinkId>, Error> {
        if *remote == self.own {
            log::debug!("not connecting to own address");
            return Ok(None);
        }
        if let Some(link) = self.data.get(remote) {
            log::trace!("data link to {remote} already tracked as {link}");
            return Ok(Some(*link));
        }
        let link = self.transport.connect_data(remote)?;
        log::debug!("dialing data {link} to {remote}");
        self.track(link, remote, LinkKind::Data, true);
        Ok(Some(link))
    }

    /// Places a media call carrying `stream`. No-op without a stream, toward
    /// ourselves, or when a media link to `remote` already exists.
    pub fn call_media(
        &mut self,
        remote: &PeerId,
        stream: Option<&LocalStream>,
    ) -> Result<Option<LinkId>, Error> {
        let stream = match stream {
            Some(stream) => stream,
            None => return Ok(None),
        };
        if *remote == self.own {
            return Ok(None);
        }
        if let Some(link) = self.media.get(remote) {
            return Ok(Some(*link));
        }
        let link = self.transport.call_media(remote, stream)?;
        log::debug!("calling {remote} on {link}");
        self.track(link, remote, LinkKind::Media, true);
        Ok(Some(link))
    }

    /// Registers an inbound link. If a link of the same kind to `remote` is
    /// already tracked, the one dialed by the smaller address survives and the
    /// other is closed. Returns false if the inbound link was refused.
    fn admit(&mut self, link: LinkId, remote: &PeerId, kind: LinkKind) -> bool {
        if *remote == self.own {
            log::warn!("refusing {kind} {link} from own address");
            self.transport.close(link);
            return false;
        }
        let existing = match kind {
            LinkKind::Data => self.data.get(remote),
            LinkKind::Media => self.media.get(remote),
        }
        .copied();

        if let Some(existing) = existing {
            let keep_existing = self
                .links
                .get(&existing)
                .map(|entry| entry.outbound && self.own < *remote)
                .unwrap_or(false);
            if keep_existing {
                log::debug!("{kind} collision with {remote}: keeping {existing}, closing {link}");
                self.transport.close(link);
                return false;
            }
            log::debug!("{kind} collision with {remote}: keeping {link}, closing {existing}");
            self.untrack(existing);
            self.transport.close(existing);
        }
        self.track(link, remote, kind, false);
        true
    }

    pub fn accept_data(&mut self, link: LinkId, remote: &PeerId) -> bool {
        self.admit(link, remote, LinkKind::Data)
    }

    /// Accepts an inbound media call, answering with `stream` (receive-only
    /// without one).
    pub fn answer_media(
        &mut self,
        link: LinkId,
        remote: &PeerId,
        stream: Option<&LocalStream>,
    ) -> bool {
        if !self.admit(link, remote, LinkKind::Media) {
            return false;
        }
        if let Err(e) = self.transport.answer_media(link, stream) {
            log::error!("failed to answer {link} from {remote}: {e}");
            self.untrack(link);
            self.transport.close(link);
            return false;
        }
        true
    }

    /// Marks a tracked link open.
    pub fn on_open(&mut self, link: LinkId) -> Option<TrackedLink> {
        let entry = self.links.get_mut(&link)?;
        if entry.state == LinkState::Connecting {
            entry.state = LinkState::Open;
        }
        Some(entry.clone())
    }

    pub fn on_stream(&mut self, link: LinkId) -> Option<TrackedLink> {
        let entry = self.links.get_mut(&link)?;
        entry.state = LinkState::Streaming;
        Some(entry.clone())
    }

    /// The transport closed the link. Returns it if it was tracked.
    pub fn on_closed(&mut self, link: LinkId) -> Option<TrackedLink> {
        self.untrack(link)
    }

    /// Untracks and closes a link.
    pub fn close(&mut self, link: LinkId) -> Option<TrackedLink> {
        let entry = self.untrack(link);
        self.transport.close(link);
        entry
    }

    /// Closes every tracked link. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        let links: Vec<LinkId> = self.links.keys().copied().collect();
        for link in &links {
            self.untrack(*link);
            self.transport.close(*link);
        }
        links.len()
    }

    /// Sends over a tracked, open data link.
    pub fn send(&self, link: LinkId, payload: Vec<u8>) -> Result<(), Error> {
        let entry = self.links.get(&link).ok_or(Error::LinkNotFound)?;
        if entry.kind != LinkKind::Data || entry.state != LinkState::Open {
            return Err(Error::LinkNotOpen);
        }
        self.transport.send(link, payload)
    }

    pub fn replace_video_track(&self, link: LinkId, track: &MediaTrack) -> Result<(), Error> {
        match self.links.get(&link) {
            Some(entry) if entry.kind == LinkKind::Media => {
                self.transport.replace_video_track(link, track)
            }
            _ => Err(Error::LinkNotFound),
        }
    }

    pub fn get(&self, link: LinkId) -> Option<&TrackedLink> {
        self.links.get(&link)
    }

    pub fn data_link(&self, remote: &PeerId) -> Option<&TrackedLink> {
        self.data.get(remote).and_then(|link| self.links.get(link))
    }

    pub fn media_link(&self, remote: &PeerId) -> Option<&TrackedLink> {
        self.media.get(remote).and_then(|link| self.links.get(link))
    }

    pub fn has_data(&self, remote: &PeerId) -> bool {
        self.data.contains_key(remote)
    }

    /// true while any link to `remote` remains
    pub fn has_links(&self, remote: &PeerId) -> bool {
        self.data.contains_key(remote) || self.media.contains_key(remote)
    }

    pub fn open_data_links(&self) -> Vec<(LinkId, PeerId)> {
        let mut links: Vec<_> = self
            .data
            .values()
            .filter_map(|link| self.links.get(link))
            .filter(|entry| entry.state == LinkState::Open)
            .map(|entry| (entry.id, entry.remote.clone()))
            .collect();
        links.sort();
        links
    }

    pub fn media_links(&self) -> Vec<(LinkId, PeerId)> {
        let mut links: Vec<_> = self
            .media
            .iter()
            .map(|(remote, link)| (*link, remote.clone()))
            .collect();
        links.sort();
        links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

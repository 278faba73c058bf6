//! The per-call mesh state machine. It owns the link table, the directory and
//! the local media of one node and advances them on every transport event.
//! Nothing in here awaits; the controller task feeds it one event at a time.
//!
//! Who dials whom:
//! - a joiner dials the data link to the host and calls the host's media once
//!   it opens; the host calls back when the joiner's `join` arrives
//! - between two joiners, only the smaller address dials the data link, and
//!   both ends call media once it is open
//!
//! Either end of a pair may lack a local stream, so both ends call. When both
//! calls go through, the link manager keeps the one placed by the smaller
//! address, so every pair ends up with one data link and one media link.
//!
//! Participants learned from a list or an announcement stay pending until a
//! link to them exists. Only linked participants enter the directory.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use huddle::{
    call::{
        media::{MediaStream, MediaTrack},
        CallConfig, CallEventKind, LocalMediaState, ParticipantRecord, ParticipantSummary, PeerId,
        LOCAL_ID,
    },
    error::Error,
    sync::Arc,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    config::MeshSettings,
    directory::{Directory, Upsert},
    host_media::{self, LocalMedia},
    links::LinkManager,
    message_bus::{self, EnvelopeHandler, Origin},
    signaling::Envelope,
    transport::{LinkEventKind, LinkId, LinkKind, Transport, TransportEvent},
};

pub struct MeshCoordinator {
    own: PeerId,
    config: CallConfig,
    settings: MeshSettings,
    transport: Arc<dyn Transport>,
    links: LinkManager,
    directory: Directory,
    media: LocalMedia,
    ui_event_ch: broadcast::Sender<CallEventKind>,
    pending: HashMap<PeerId, Pending>,
    online: bool,
    terminated: bool,
}

struct Pending {
    participant: ParticipantSummary,
    // learned from an announcement rather than the initial list
    announced: bool,
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl MeshCoordinator {
    pub fn new(
        own: PeerId,
        config: CallConfig,
        settings: MeshSettings,
        transport: Arc<dyn Transport>,
        media: LocalMedia,
        ui_event_ch: broadcast::Sender<CallEventKind>,
    ) -> Self {
        Self {
            links: LinkManager::new(own.clone(), transport.clone()),
            directory: Directory::new(ui_event_ch.clone()),
            own,
            config,
            settings,
            transport,
            media,
            ui_event_ch,
            pending: HashMap::new(),
            online: false,
            terminated: false,
        }
    }

    pub fn own_address(&self) -> &PeerId {
        &self.own
    }

    pub fn host_address(&self) -> PeerId {
        if self.config.is_host {
            self.own.clone()
        } else {
            self.config.host_address()
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn links(&self) -> &LinkManager {
        &self.links
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn participants(&self) -> Vec<ParticipantRecord> {
        self.directory.all()
    }

    pub fn local_state(&self) -> LocalMediaState {
        self.media.state()
    }

    pub fn screen_track_id(&self) -> Option<Uuid> {
        self.media.screen_track_id()
    }

    fn emit(&self, event: CallEventKind) {
        let _ = self.ui_event_ch.send(event);
    }

    fn system_chat(&self, text: String) {
        self.emit(CallEventKind::ChatMessage {
            sender: self.settings.system_sender.clone(),
            text,
            timestamp: timestamp(),
        });
    }

    fn ensure_active(&self) -> Result<(), Error> {
        if self.terminated {
            return Err(Error::CallTerminated);
        }
        Ok(())
    }

    /// Registers the local record and, for a joiner with a registered
    /// address, dials the host.
    pub fn start(&mut self, online: bool) {
        let state = self.media.state();
        let mut record = ParticipantRecord::new(
            PeerId::from(LOCAL_ID),
            self.config.display_name.clone(),
            self.config.origin_info.clone(),
        )
        .with_host(self.config.is_host);
        record.media_stream = self.media.stream().map(|s| s.handle());
        record.muted = state.muted;
        record.video_on = state.video_on;
        self.directory.set_local(record);

        self.online = online;
        if !online {
            log::info!("mesh offline, running with local media only");
            return;
        }
        if !self.config.is_host {
            let host = self.host_address();
            log::debug!("{} dialing host {host}", self.own);
            if let Err(e) = self.links.connect_data(&host) {
                log::error!("failed to dial host {host}: {e}");
            }
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.terminated {
            return;
        }
        log::trace!("{}: {event}", self.own);
        let TransportEvent {
            link,
            remote,
            source,
            kind,
        } = event;

        match (source, kind) {
            (LinkKind::Data, LinkEventKind::Incoming) => {
                self.links.accept_data(link, &remote);
            }
            (LinkKind::Data, LinkEventKind::Open) => self.on_data_open(link),
            (LinkKind::Data, LinkEventKind::Message(payload)) => {
                if self.links.get(link).is_none() {
                    log::debug!("ignoring message on untracked {link}");
                    return;
                }
                let from = Origin { link, remote };
                message_bus::dispatch(self, &from, &payload);
            }
            (LinkKind::Media, LinkEventKind::Incoming) => {
                self.links.answer_media(link, &remote, self.media.stream());
            }
            (LinkKind::Media, LinkEventKind::Stream(stream)) => self.on_stream(link, &remote, stream),
            (_, LinkEventKind::Closed) => {
                if let Some(closed) = self.links.on_closed(link) {
                    log::debug!("{} {link} to {} closed", closed.kind, closed.remote);
                    self.on_link_gone(&closed.remote);
                }
            }
            (_, LinkEventKind::Error(reason)) => {
                log::warn!("{source} {link} to {remote} failed: {reason}");
                if let Some(closed) = self.links.close(link) {
                    self.on_link_gone(&closed.remote);
                }
            }
            (source, kind) => log::debug!("ignoring {kind} on {source} {link}"),
        }
    }

    fn on_data_open(&mut self, link: LinkId) {
        let opened = match self.links.on_open(link) {
            Some(opened) => opened,
            None => return,
        };
        self.promote(&opened.remote);
        if !opened.outbound {
            // the host calls once the join arrives
            if !self.config.is_host {
                self.call_media(&opened.remote);
            }
            return;
        }
        let join = Envelope::Join {
            id: self.own.clone(),
            display_name: self.config.display_name.clone(),
            origin_info: self.config.origin_info.clone(),
        };
        message_bus::send(&self.links, link, &join);
        if opened.remote == self.host_address() {
            message_bus::send(&self.links, link, &Envelope::ListRequest);
        }
        self.call_media(&opened.remote);
    }

    fn on_stream(&mut self, link: LinkId, remote: &PeerId, stream: MediaStream) {
        if self.links.on_stream(link).is_none() {
            log::debug!("ignoring stream on untracked {link}");
            return;
        }
        self.promote(remote);
        let is_host = *remote == self.host_address();
        if self.directory.attach_stream(remote, stream, is_host) == Upsert::Inserted {
            log::debug!("stream from {remote} arrived before its join");
        }
    }

    fn on_link_gone(&mut self, remote: &PeerId) {
        if self.links.has_links(remote) {
            return;
        }
        self.pending.remove(remote);
        if let Some(record) = self.directory.remove(remote) {
            log::info!("{} left the call", record.display_name);
            self.system_chat(format!("{} left the meeting", record.display_name));
        }
    }

    fn call_media(&mut self, remote: &PeerId) {
        if let Err(e) = self.links.call_media(remote, self.media.stream()) {
            log::error!("failed to call {remote}: {e}");
        }
    }

    /// Dials `remote` unless a data link exists or it is the other side's
    /// turn to dial.
    fn connect_if_dialer(&mut self, remote: &PeerId) {
        if *remote == self.own || self.links.has_data(remote) {
            return;
        }
        if self.own > *remote {
            log::trace!("waiting for {remote} to dial");
            return;
        }
        if let Err(e) = self.links.connect_data(remote) {
            log::error!("failed to dial {remote}: {e}");
        }
    }

    /// Upserts a remote record. Returns true if the participant was not known
    /// by name before.
    fn admit_participant(&mut self, participant: ParticipantSummary) -> bool {
        let known = self
            .directory
            .get(&participant.id)
            .map(|r| !r.is_placeholder())
            .unwrap_or(false);
        self.directory.upsert(participant.into());
        !known
    }

    /// Admits a participant learned from the host. Until some link to it
    /// exists it is only remembered.
    fn learn_participant(&mut self, participant: ParticipantSummary, announced: bool) {
        let id = participant.id.clone();
        if !self.directory.contains(&id) && !self.links.has_links(&id) {
            log::trace!("{id} pending until linked");
            self.pending.insert(
                id.clone(),
                Pending {
                    participant,
                    announced,
                },
            );
            self.connect_if_dialer(&id);
            return;
        }
        let name = participant.display_name.clone();
        if self.admit_participant(participant) && announced {
            self.system_chat(format!("{name} joined the meeting"));
        }
        self.connect_if_dialer(&id);
    }

    /// Moves a pending participant into the directory once linked.
    fn promote(&mut self, remote: &PeerId) {
        let Pending {
            participant,
            announced,
        } = match self.pending.remove(remote) {
            Some(pending) => pending,
            None => return,
        };
        let name = participant.display_name.clone();
        if self.admit_participant(participant) && announced {
            self.system_chat(format!("{name} joined the meeting"));
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &PeerId> {
        self.pending.keys()
    }

    fn from_host(&self, from: &Origin) -> bool {
        if from.remote == self.host_address() {
            return true;
        }
        log::warn!("ignoring host-only envelope from {}", from.remote);
        false
    }

    pub fn send_chat(&mut self, text: &str) -> Result<(), Error> {
        self.ensure_active()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }
        let timestamp = timestamp();
        let envelope = Envelope::Chat {
            display_name: self.config.display_name.clone(),
            text: text.to_string(),
            timestamp: timestamp.clone(),
        };
        let sent = message_bus::broadcast(&self.links, &envelope, None);
        log::debug!("chat went out on {sent} links");
        self.emit(CallEventKind::ChatMessage {
            sender: self.config.display_name.clone(),
            text: text.to_string(),
            timestamp,
        });
        Ok(())
    }

    fn local_media_changed(&mut self) {
        let state = self.media.state();
        self.directory.update_local(|record| {
            record.muted = state.muted;
            record.video_on = state.video_on;
        });
        self.emit(CallEventKind::LocalMediaChanged { state });
    }

    pub fn toggle_mute(&mut self) -> Result<bool, Error> {
        self.ensure_active()?;
        let muted = self.media.toggle_mute()?;
        self.local_media_changed();
        Ok(muted)
    }

    pub fn toggle_video(&mut self) -> Result<bool, Error> {
        self.ensure_active()?;
        let video_on = self.media.toggle_video()?;
        self.local_media_changed();
        Ok(video_on)
    }

    pub fn set_visibility(&mut self, visible: bool) -> Result<(), Error> {
        self.ensure_active()?;
        self.media.set_visibility(visible);
        self.local_media_changed();
        Ok(())
    }

    /// Checks made before prompting for a screen capture.
    pub fn can_start_screen_share(&self) -> Result<(), Error> {
        self.ensure_active()?;
        let state = self.media.state();
        if !state.has_media {
            return Err(Error::MediaUnavailable("no local stream".into()));
        }
        if state.screen_sharing {
            return Err(Error::ScreenShareActive);
        }
        Ok(())
    }

    pub fn begin_screen_share(&mut self, track: MediaTrack) -> Result<(), Error> {
        self.ensure_active()?;
        self.media.begin_screen_share(track.clone())?;
        let updated = host_media::propagate_video(&self.links, &track);
        log::debug!("screen track sent on {updated} media links");
        self.local_media_changed();
        Ok(())
    }

    pub fn end_screen_share(&mut self, camera: Option<MediaTrack>) -> Result<(), Error> {
        self.ensure_active()?;
        if let Some(track) = self.media.end_screen_share(camera)? {
            let updated = host_media::propagate_video(&self.links, &track);
            log::debug!("camera track restored on {updated} media links");
        }
        self.local_media_changed();
        Ok(())
    }

    /// Closes every link, stops local capture, releases the address and
    /// clears all state. Runs once; later calls return false.
    pub fn terminate(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        let closed = self.links.close_all();
        self.media.stop_all();
        self.transport.shutdown();
        self.directory.clear();
        self.pending.clear();
        log::info!("{} left the call, closed {closed} links", self.own);
        self.emit(CallEventKind::CallTerminated);
        true
    }
}

impl EnvelopeHandler for MeshCoordinator {
    fn on_join(&mut self, from: &Origin, participant: ParticipantSummary) {
        let name = participant.display_name.clone();
        if self.admit_participant(participant.clone()) {
            log::info!("{name} ({}) joined", participant.id);
            self.system_chat(format!("{name} joined the meeting"));
        }
        if !self.config.is_host {
            return;
        }
        let announce = Envelope::AnnounceNewParticipant { participant };
        let sent = message_bus::broadcast(&self.links, &announce, Some(&from.remote));
        log::debug!("announced {} to {sent} participants", from.remote);
        self.call_media(&from.remote);
    }

    fn on_list_request(&mut self, from: &Origin) {
        if !self.config.is_host {
            log::debug!("ignoring list request from {}", from.remote);
            return;
        }
        let mut records = vec![ParticipantSummary {
            id: self.own.clone(),
            display_name: self.config.display_name.clone(),
            origin_info: self.config.origin_info.clone(),
            is_host: true,
        }];
        records.extend(
            self.directory
                .remotes()
                .filter(|r| r.id != from.remote)
                .map(|r| r.summary()),
        );
        message_bus::send(&self.links, from.link, &Envelope::ListResponse { records });
    }

    fn on_list_response(&mut self, from: &Origin, records: Vec<ParticipantSummary>) {
        if !self.from_host(from) {
            return;
        }
        for record in records {
            if record.id != self.own {
                self.learn_participant(record, false);
            }
        }
    }

    fn on_announce(&mut self, from: &Origin, participant: ParticipantSummary) {
        if !self.from_host(from) || participant.id == self.own {
            return;
        }
        self.learn_participant(participant, true);
    }

    fn on_chat(&mut self, _from: &Origin, display_name: String, text: String, timestamp: String) {
        self.emit(CallEventKind::ChatMessage {
            sender: display_name,
            text,
            timestamp,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::sim::{SimMediaDevices, SimNetwork, SimTransport};
    use crate::host_media::MediaDevices;
    use huddle::call::media::LocalStream;

    struct Node {
        coordinator: MeshCoordinator,
        transport: Arc<SimTransport>,
        events: broadcast::Receiver<CallEventKind>,
    }

    impl Node {
        fn drain(&mut self) -> Vec<CallEventKind> {
            std::iter::from_fn(|| self.events.try_recv().ok()).collect()
        }

        fn remote_ids(&self) -> Vec<PeerId> {
            let mut ids: Vec<_> = self
                .coordinator
                .directory()
                .remotes()
                .map(|r| r.id.clone())
                .collect();
            ids.sort();
            ids
        }
    }

    async fn node(network: &SimNetwork, config: CallConfig) -> anyhow::Result<Node> {
        let stream = SimMediaDevices::new().user_media().await?;
        node_with(network, config, Some(stream)).await
    }

    async fn node_with(
        network: &SimNetwork,
        config: CallConfig,
        stream: Option<LocalStream>,
    ) -> anyhow::Result<Node> {
        let own = if config.is_host {
            PeerId::new(config.call_id.clone())
        } else {
            config.address.clone().expect("test joiners have fixed addresses")
        };
        let transport = Arc::new(network.transport());
        transport.register(&own).await?;
        let (tx, events) = broadcast::channel(1024);
        let mut coordinator = MeshCoordinator::new(
            own,
            config,
            MeshSettings::default(),
            transport.clone(),
            LocalMedia::new(stream),
            tx,
        );
        coordinator.start(true);
        Ok(Node {
            coordinator,
            transport,
            events,
        })
    }

    fn joiner(address: &str, name: &str) -> CallConfig {
        CallConfig::joiner("room1", name)
            .with_address(address)
            .with_origin(format!("origin-of-{name}"))
    }

    /// Feeds queued transport events to their nodes until the mesh is quiet.
    fn settle(nodes: &mut [Node]) {
        loop {
            let mut progressed = false;
            for node in nodes.iter_mut() {
                while let Some(event) = node.transport.try_next_event() {
                    node.coordinator.handle_event(event);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    async fn three_node_mesh(network: &SimNetwork) -> anyhow::Result<Vec<Node>> {
        let mut nodes = vec![node(network, CallConfig::host("room1", "Hana")).await?];
        nodes.push(node(network, joiner("participant_b", "Bea")).await?);
        settle(&mut nodes);
        nodes.push(node(network, joiner("participant_c", "Cal")).await?);
        settle(&mut nodes);
        Ok(nodes)
    }

    #[tokio::test]
    async fn host_and_two_joiners_converge() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let nodes = three_node_mesh(&network).await?;

        assert_eq!(network.link_count(LinkKind::Data), 3);
        assert_eq!(network.link_count(LinkKind::Media), 3);

        let host = PeerId::from("room1");
        let b = PeerId::from("participant_b");
        let c = PeerId::from("participant_c");
        assert_eq!(nodes[0].remote_ids(), vec![b.clone(), c.clone()]);
        assert_eq!(nodes[1].remote_ids(), vec![c.clone(), host.clone()]);
        assert_eq!(nodes[2].remote_ids(), vec![b.clone(), host.clone()]);
        for node in &nodes {
            assert_eq!(node.coordinator.directory().len(), 3);
            assert!(node.coordinator.directory().remotes().all(|r| r.media_stream.is_some()));
        }

        // the host shows up with its real name and flag
        let seen_by_b = nodes[1].coordinator.directory().get(&host).cloned().expect("host record");
        assert_eq!(seen_by_b.display_name, "Hana");
        assert!(seen_by_b.is_host);
        let c_seen_by_b = nodes[1].coordinator.directory().get(&c).cloned().expect("c record");
        assert_eq!(c_seen_by_b.display_name, "Cal");
        assert_eq!(c_seen_by_b.origin_info, "origin-of-Cal");
        Ok(())
    }

    #[tokio::test]
    async fn chat_reaches_each_peer_once() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = three_node_mesh(&network).await?;
        for node in nodes.iter_mut() {
            node.drain();
        }

        nodes[1].coordinator.send_chat("  hello all ")?;
        settle(&mut nodes);

        for (i, node) in nodes.iter_mut().enumerate() {
            let chats: Vec<_> = node
                .drain()
                .into_iter()
                .filter_map(|e| match e {
                    CallEventKind::ChatMessage { sender, text, .. } => Some((sender, text)),
                    _ => None,
                })
                .collect();
            assert_eq!(chats, vec![("Bea".to_string(), "hello all".to_string())], "node {i}");
        }
        assert!(matches!(nodes[1].coordinator.send_chat("   "), Err(Error::EmptyMessage)));
        Ok(())
    }

    #[tokio::test]
    async fn departure_removes_once() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = three_node_mesh(&network).await?;
        for node in nodes.iter_mut() {
            node.drain();
        }

        let c = PeerId::from("participant_c");
        assert!(nodes[2].coordinator.terminate());
        assert!(!nodes[2].coordinator.terminate());
        settle(&mut nodes);

        for node in nodes.iter_mut().take(2) {
            let events = node.drain();
            let removed = events
                .iter()
                .filter(|e| matches!(e, CallEventKind::ParticipantRemoved { id } if *id == c))
                .count();
            assert_eq!(removed, 1);
            assert!(events.iter().any(|e| matches!(
                e,
                CallEventKind::ChatMessage { text, .. } if text == "Cal left the meeting"
            )));
            assert!(!node.coordinator.directory().contains(&c));
        }
        assert_eq!(network.link_count(LinkKind::Data), 1);
        assert_eq!(network.link_count(LinkKind::Media), 1);
        assert!(nodes[2].coordinator.participants().is_empty());
        assert!(matches!(nodes[2].coordinator.send_chat("hi"), Err(Error::CallTerminated)));
        Ok(())
    }

    #[tokio::test]
    async fn stream_before_join_yields_single_record() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = vec![node(&network, CallConfig::host("room1", "Hana")).await?];
        let host = PeerId::from("room1");

        // a bare transport that calls before it says who it is
        let stranger = network.transport();
        let stranger_id = PeerId::from("participant_x");
        stranger.register(&stranger_id).await?;
        let stream = SimMediaDevices::new().user_media().await?;
        stranger.call_media(&host, &stream)?;
        settle(&mut nodes);

        let record = nodes[0].coordinator.directory().get(&stranger_id).cloned().expect("placeholder");
        assert_eq!(record.display_name, "Participant partic");
        assert_eq!(record.media_stream, Some(stream.handle()));

        let link = stranger.connect_data(&host)?;
        let join = Envelope::Join {
            id: stranger_id.clone(),
            display_name: "Xena".into(),
            origin_info: "10.0.0.9".into(),
        };
        stranger.send(link, join.encode()?)?;
        settle(&mut nodes);

        let directory = nodes[0].coordinator.directory();
        assert_eq!(directory.len(), 2);
        let record = directory.get(&stranger_id).cloned().expect("record");
        assert_eq!(record.display_name, "Xena");
        assert_eq!(record.media_stream, Some(stream.handle()));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_and_malformed_envelopes_are_dropped() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = vec![node(&network, CallConfig::host("room1", "Hana")).await?];
        let stranger = network.transport();
        stranger.register(&PeerId::from("participant_x")).await?;
        let link = stranger.connect_data(&PeerId::from("room1"))?;
        settle(&mut nodes);
        nodes[0].drain();

        stranger.send(link, br#"{"kind":"welcome","message":"hi"}"#.to_vec())?;
        stranger.send(link, b"garbage".to_vec())?;
        stranger.send(link, br#"{"kind":"list-response","records":[]}"#.to_vec())?;
        settle(&mut nodes);

        assert!(nodes[0].drain().is_empty());
        assert_eq!(nodes[0].coordinator.directory().len(), 1);
        assert!(nodes[0].coordinator.links().has_data(&PeerId::from("participant_x")));
        Ok(())
    }

    #[tokio::test]
    async fn offline_node_keeps_local_media() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let transport = Arc::new(network.transport());
        let (tx, _events) = broadcast::channel(16);
        let stream = SimMediaDevices::new().user_media().await?;
        let mut coordinator = MeshCoordinator::new(
            PeerId::from("participant_b"),
            joiner("participant_b", "Bea"),
            MeshSettings::default(),
            transport.clone(),
            LocalMedia::new(Some(stream)),
            tx,
        );
        coordinator.start(false);

        assert!(coordinator.links().is_empty());
        assert_eq!(coordinator.participants().len(), 1);
        assert!(coordinator.toggle_mute()?);
        assert!(coordinator.participants()[0].muted);
        Ok(())
    }

    #[tokio::test]
    async fn screen_share_reaches_every_media_link() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = three_node_mesh(&network).await?;
        let devices = SimMediaDevices::new();
        let b = PeerId::from("participant_b");

        nodes[1].coordinator.can_start_screen_share()?;
        let screen = devices.display_media().await?;
        nodes[1].coordinator.begin_screen_share(screen.clone())?;
        assert!(matches!(
            nodes[1].coordinator.can_start_screen_share(),
            Err(Error::ScreenShareActive)
        ));

        let media_links = network.links_of(&b, LinkKind::Media);
        assert_eq!(media_links.len(), 2);
        for (link, _) in &media_links {
            assert_eq!(network.outgoing_video(*link, &b), Some(screen.id()));
        }

        let camera = devices.camera_track().await?;
        nodes[1].coordinator.end_screen_share(Some(camera.clone()))?;
        for (link, _) in &media_links {
            assert_eq!(network.outgoing_video(*link, &b), Some(camera.id()));
        }
        assert!(screen.is_ended());
        settle(&mut nodes);
        Ok(())
    }

    #[tokio::test]
    async fn host_without_media_still_receives_joiner_stream() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = vec![node_with(&network, CallConfig::host("room1", "Hana"), None).await?];
        nodes.push(node(&network, joiner("participant_b", "Bea")).await?);
        settle(&mut nodes);

        let b = PeerId::from("participant_b");
        let host = PeerId::from("room1");
        assert_eq!(network.link_count(LinkKind::Media), 1);
        let seen_by_host = nodes[0].coordinator.directory().get(&b).cloned().expect("b record");
        assert_eq!(seen_by_host.display_name, "Bea");
        assert!(seen_by_host.media_stream.is_some());
        let seen_by_b = nodes[1].coordinator.directory().get(&host).cloned().expect("host record");
        assert!(seen_by_b.media_stream.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dialer_without_media_still_receives_peer_stream() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = vec![node(&network, CallConfig::host("room1", "Hana")).await?];
        nodes.push(node_with(&network, joiner("participant_b", "Bea"), None).await?);
        settle(&mut nodes);
        nodes.push(node(&network, joiner("participant_c", "Cal")).await?);
        settle(&mut nodes);

        // b dials c, but only c has something to send
        let b = PeerId::from("participant_b");
        let c = PeerId::from("participant_c");
        assert_eq!(network.link_count(LinkKind::Data), 3);
        assert_eq!(network.link_count(LinkKind::Media), 3);
        let c_seen_by_b = nodes[1].coordinator.directory().get(&c).cloned().expect("c record");
        assert!(c_seen_by_b.media_stream.is_some());
        let b_seen_by_c = nodes[2].coordinator.directory().get(&b).cloned().expect("b record");
        assert_eq!(b_seen_by_c.display_name, "Bea");
        assert!(b_seen_by_c.media_stream.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn media_calls_from_both_ends_leave_one_link() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let nodes = three_node_mesh(&network).await?;
        for node in &nodes {
            let own = node.coordinator.own_address().clone();
            assert_eq!(network.links_of(&own, LinkKind::Media).len(), 2);
            assert_eq!(node.coordinator.links().media_links().len(), 2);
        }
        Ok(())
    }

    #[tokio::test]
    async fn announced_peer_that_never_links_is_not_listed() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = vec![node(&network, CallConfig::host("room1", "Hana")).await?];
        nodes.push(node(&network, joiner("participant_z", "Zed")).await?);
        settle(&mut nodes);
        for node in nodes.iter_mut() {
            node.drain();
        }

        // joins through the host, then vanishes before dialing z
        let a = PeerId::from("participant_a");
        let stranger = network.transport();
        stranger.register(&a).await?;
        let link = stranger.connect_data(&PeerId::from("room1"))?;
        let join = Envelope::Join {
            id: a.clone(),
            display_name: "Ada".into(),
            origin_info: "10.0.0.7".into(),
        };
        stranger.send(link, join.encode()?)?;
        settle(&mut nodes);

        assert!(nodes[0].coordinator.directory().contains(&a));
        assert!(!nodes[1].coordinator.directory().contains(&a));
        assert_eq!(nodes[1].coordinator.pending().collect::<Vec<_>>(), vec![&a]);

        network.crash(&a);
        settle(&mut nodes);

        assert!(!nodes[0].coordinator.directory().contains(&a));
        assert_eq!(nodes[0].remote_ids(), vec![PeerId::from("participant_z")]);
        assert_eq!(nodes[1].remote_ids(), vec![PeerId::from("room1")]);
        // z never showed ada, so it has nothing to announce either way
        let chats = nodes[1]
            .drain()
            .into_iter()
            .filter(|e| matches!(e, CallEventKind::ChatMessage { .. }))
            .count();
        assert_eq!(chats, 0);
        Ok(())
    }

    #[tokio::test]
    async fn announced_peer_is_listed_once_linked() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = vec![node(&network, CallConfig::host("room1", "Hana")).await?];
        nodes.push(node(&network, joiner("participant_b", "Bea")).await?);
        settle(&mut nodes);
        nodes[1].drain();

        nodes.push(node(&network, joiner("participant_c", "Cal")).await?);
        settle(&mut nodes);

        let joined: Vec<_> = nodes[1]
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                CallEventKind::ChatMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(joined, vec!["Cal joined the meeting".to_string()]);
        assert!(nodes[1].coordinator.pending().next().is_none());
        assert!(nodes[2].coordinator.pending().next().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn host_on_local_key_cannot_replace_own_record() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = vec![node(&network, CallConfig::host("local", "Hana")).await?];
        let config = joiner("participant_b", "Bea").with_host_address("local");
        nodes.push(node(&network, config).await?);
        settle(&mut nodes);

        let records = nodes[1].coordinator.participants();
        assert!(records[0].is_local());
        assert_eq!(records[0].display_name, "Bea");
        assert!(records.iter().filter(|r| r.is_local()).count() == 1);
        assert!(records.iter().all(|r| r.display_name != "Hana"));
        Ok(())
    }
}

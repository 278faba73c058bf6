pub mod common;

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::common::{
        self, create_mesh, create_room, create_room_with, drain_events, key_set, wait_for_count,
        wait_for_event,
    };
    use huddle::{
        call::{Call, CallConfig, CallEventKind, PeerId, RendezvousStatus},
        error::Error,
        module::Module,
        sync::Arc,
        Extension,
    };
    use huddle_mesh::{
        transport::{
            sim::{SimMediaDevices, SimNetwork},
            LinkKind,
        },
        MediaPolicy, MeshRoom,
    };

    #[tokio::test]
    async fn host_is_reachable_at_call_id() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let (host, _, _) = create_room(&network, CallConfig::host("room1", "Hana")).await?;
        assert_eq!(host.own_address().await?, PeerId::from("room1"));
        assert_eq!(host.rendezvous_status().await?, RendezvousStatus::Connected);
        assert_eq!(host.module(), Module::Media);

        let records = host.participants().await?;
        assert_eq!(records.len(), 1);
        assert!(records[0].is_local() && records[0].is_host);
        Ok(())
    }

    #[tokio::test]
    async fn three_participants_converge() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let nodes = create_mesh(&network, &["Bea", "Cal"]).await?;

        let expected = key_set(&nodes[0].0).await?;
        assert_eq!(expected.len(), 3);
        for (room, _, _) in &nodes[1..] {
            assert_eq!(key_set(room).await?, expected);
        }
        // full mesh, no relaying through the host
        assert_eq!(network.link_count(LinkKind::Data), 3);
        assert_eq!(network.link_count(LinkKind::Media), 3);

        // everyone sees the host by name
        for (room, _, _) in &nodes[1..] {
            let host = room
                .participants()
                .await?
                .into_iter()
                .find(|r| r.is_host && !r.is_local())
                .expect("host record");
            assert_eq!(host.id, PeerId::from("room1"));
            assert_eq!(host.display_name, "Hana");
            assert_eq!(host.origin_info, "10.0.0.1");
        }
        Ok(())
    }

    #[tokio::test]
    async fn chat_reaches_everyone_once() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = create_mesh(&network, &["Bea", "Cal"]).await?;
        for (_, _, events) in nodes.iter_mut() {
            drain_events(events).await;
        }

        nodes[1].0.send_chat("hello everyone").await?;

        for (_, _, events) in nodes.iter_mut() {
            let chats: Vec<_> = drain_events(events)
                .await
                .into_iter()
                .filter_map(|e| match e {
                    CallEventKind::ChatMessage { sender, text, .. } => Some((sender, text)),
                    _ => None,
                })
                .collect();
            assert_eq!(chats, vec![("Bea".to_string(), "hello everyone".to_string())]);
        }

        assert!(matches!(nodes[1].0.send_chat(" ").await, Err(Error::EmptyMessage)));
        Ok(())
    }

    #[tokio::test]
    async fn leaving_participant_is_removed_once() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = create_mesh(&network, &["Bea", "Cal"]).await?;
        let leaving = nodes[2].0.own_address().await?;
        for (_, _, events) in nodes.iter_mut() {
            drain_events(events).await;
        }

        nodes[2].0.leave_call().await?;
        assert!(!network.is_registered(&leaving));

        for (room, _, events) in nodes.iter_mut().take(2) {
            wait_for_count(room, 2).await?;
            let events = drain_events(events).await;
            let removed = events
                .iter()
                .filter(|e| matches!(e, CallEventKind::ParticipantRemoved { id } if *id == leaving))
                .count();
            assert_eq!(removed, 1);
            assert!(events.iter().any(|e| matches!(
                e,
                CallEventKind::ChatMessage { text, .. } if text == "Cal left the meeting"
            )));
        }
        assert_eq!(network.link_count(LinkKind::Data), 1);
        assert_eq!(network.link_count(LinkKind::Media), 1);

        let (room, _, events) = &mut nodes[2];
        assert!(drain_events(events)
            .await
            .iter()
            .any(|e| matches!(e, CallEventKind::CallTerminated)));
        assert!(matches!(room.send_chat("still here?").await, Err(Error::CallTerminated)));
        assert!(matches!(room.leave_call().await, Err(Error::CallTerminated)));
        Ok(())
    }

    #[tokio::test]
    async fn crashed_participant_is_removed() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let nodes = create_mesh(&network, &["Bea", "Cal"]).await?;
        let crashed = nodes[1].0.own_address().await?;

        network.crash(&crashed);

        for index in [0, 2] {
            let room = &nodes[index].0;
            wait_for_count(room, 2).await?;
            assert!(!key_set(room).await?.contains(&crashed));
        }
        Ok(())
    }

    #[tokio::test]
    async fn dropping_a_room_tears_it_down() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = create_mesh(&network, &["Bea"]).await?;
        let address = nodes[1].0.own_address().await?;

        let (room, _, _) = nodes.remove(1);
        drop(room);

        wait_for_count(&nodes[0].0, 1).await?;
        assert!(!network.is_registered(&address));
        assert_eq!(network.link_count(LinkKind::Data), 0);
        Ok(())
    }

    #[tokio::test]
    async fn registration_timeout_goes_offline() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        network.hang_registration("participant_slow");
        let config = CallConfig::joiner("room1", "Bea").with_address("participant_slow");
        let (mut room, _, mut events) = create_room(&network, config).await?;

        assert_eq!(room.rendezvous_status().await?, RendezvousStatus::Offline);
        wait_for_event(&mut events, |e| {
            matches!(
                e,
                CallEventKind::RendezvousStatusChanged {
                    status: RendezvousStatus::Offline
                }
            )
        })
        .await?;

        // local media still works
        assert_eq!(room.participants().await?.len(), 1);
        assert!(room.toggle_mute().await?);
        assert!(room.local_state().await?.muted);
        Ok(())
    }

    #[tokio::test]
    async fn refused_registration_is_reported() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        network.fail_registration("room1");
        let (host, _, _) = create_room(&network, CallConfig::host("room1", "Hana")).await?;
        assert!(matches!(
            host.rendezvous_status().await?,
            RendezvousStatus::Failed(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn joining_without_media() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let (host, _, _) = create_room(&network, CallConfig::host("room1", "Hana")).await?;
        host.own_address().await?;

        let devices = Arc::new(SimMediaDevices::new());
        devices.deny_user_media();
        let config = CallConfig::joiner("room1", "Bea");
        let (mut room, mut events) =
            create_room_with(&network, config, common::settings(), devices).await?;

        wait_for_event(&mut events, |e| matches!(e, CallEventKind::MediaUnavailable { .. })).await?;
        assert!(!room.local_state().await?.has_media);
        assert!(matches!(room.toggle_mute().await, Err(Error::MediaUnavailable(_))));

        // the host still learns about the joiner, just without a stream
        wait_for_count(&host, 2).await?;
        let joiner = room.own_address().await?;
        let record = tokio::time::timeout(common::WAIT, async {
            loop {
                let found = host
                    .participants()
                    .await?
                    .into_iter()
                    .find(|r| r.id == joiner && !r.is_placeholder());
                if let Some(record) = found {
                    break Ok::<_, anyhow::Error>(record);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await??;
        assert_eq!(record.display_name, "Bea");
        assert!(record.media_stream.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn media_denied_can_abort() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let devices = Arc::new(SimMediaDevices::new());
        devices.deny_user_media();
        let settings = common::settings().with_media_policy(MediaPolicy::AbortCall);
        let (room, mut events) =
            create_room_with(&network, CallConfig::host("room1", "Hana"), settings, devices).await?;

        wait_for_event(&mut events, |e| matches!(e, CallEventKind::CallTerminated)).await?;
        assert!(matches!(room.own_address().await, Err(Error::CallTerminated)));
        assert!(!network.is_registered(&PeerId::from("room1")));
        Ok(())
    }

    #[tokio::test]
    async fn screen_share_reverts_when_capture_ends() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let mut nodes = create_mesh(&network, &["Bea"]).await?;
        let address = nodes[1].0.own_address().await?;
        let links = network.links_of(&address, LinkKind::Media);
        assert_eq!(links.len(), 1);
        let link = links[0].0;
        let camera = network.outgoing_video(link, &address).expect("camera");

        let (room, devices, _) = &mut nodes[1];
        assert!(matches!(room.stop_screen_share().await, Err(Error::ScreenShareInactive)));
        room.start_screen_share().await?;
        assert!(room.local_state().await?.screen_sharing);
        assert!(matches!(room.start_screen_share().await, Err(Error::ScreenShareActive)));
        let screen = network.outgoing_video(link, &address).expect("screen");
        assert_ne!(screen, camera);

        assert!(devices.end_screen_capture());
        tokio::time::timeout(common::WAIT, async {
            while room.local_state().await?.screen_sharing {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await??;

        let restored = network.outgoing_video(link, &address).expect("restored camera");
        assert_ne!(restored, screen);
        assert_ne!(restored, camera);
        Ok(())
    }

    #[tokio::test]
    async fn toggles_update_local_state() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let (mut room, _, _) = create_room(&network, CallConfig::host("room1", "Hana")).await?;

        assert!(!room.toggle_video().await?);
        room.set_visibility(false).await?;
        let state = room.local_state().await?;
        assert!(!state.video_on && !state.visible);
        room.set_visibility(true).await?;
        assert!(!room.local_state().await?.video_on);

        assert!(room.toggle_screen_share().await?);
        assert!(!room.toggle_screen_share().await?);
        assert!(!room.local_state().await?.screen_sharing);

        let local = room.participants().await?.remove(0);
        assert!(!local.video_on);
        Ok(())
    }

    #[tokio::test]
    async fn local_key_is_not_an_address() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        for config in [
            CallConfig::host("local", "Hana"),
            CallConfig::joiner("room1", "Bea").with_address("local"),
            CallConfig::joiner("room1", "Bea").with_host_address("local"),
        ] {
            let result = MeshRoom::new(
                config,
                common::settings(),
                Arc::new(network.transport()),
                Arc::new(SimMediaDevices::new()),
            );
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
        assert!(!network.is_registered(&PeerId::from("local")));
        Ok(())
    }

    #[tokio::test]
    async fn host_without_media_sees_joiner_stream() -> anyhow::Result<()> {
        let network = SimNetwork::new();
        let devices = Arc::new(SimMediaDevices::new());
        devices.deny_user_media();
        let (host, _) =
            create_room_with(&network, CallConfig::host("room1", "Hana"), common::settings(), devices)
                .await?;
        host.own_address().await?;

        let (room, _, _) = create_room(&network, CallConfig::joiner("room1", "Bea")).await?;
        let joiner = room.own_address().await?;
        tokio::time::timeout(common::WAIT, async {
            loop {
                let streaming = host
                    .participants()
                    .await?
                    .into_iter()
                    .any(|r| r.id == joiner && r.media_stream.is_some());
                if streaming {
                    break Ok::<_, anyhow::Error>(());
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await??;
        assert_eq!(network.link_count(LinkKind::Media), 1);
        Ok(())
    }
}

use std::time::Duration;

use futures::StreamExt;
use huddle::{
    call::{Call, CallConfig, CallEventKind, CallEventStream, PeerId, LOCAL_ID},
    sync::Arc,
};
use huddle_mesh::{
    transport::sim::{SimMediaDevices, SimNetwork},
    MeshRoom, MeshSettings,
};

pub const WAIT: Duration = Duration::from_secs(10);
const TICK: Duration = Duration::from_millis(10);

#[allow(dead_code)]
pub fn settings() -> MeshSettings {
    MeshSettings::default().with_registration_timeout(Duration::from_millis(200))
}

#[allow(dead_code)]
pub async fn create_room_with(
    network: &SimNetwork,
    config: CallConfig,
    settings: MeshSettings,
    devices: Arc<SimMediaDevices>,
) -> anyhow::Result<(MeshRoom, CallEventStream)> {
    let mut room = MeshRoom::new(config, settings, Arc::new(network.transport()), devices)?;
    let events = room.get_event_stream().await?;
    Ok((room, events))
}

#[allow(dead_code)]
pub async fn create_room(
    network: &SimNetwork,
    config: CallConfig,
) -> anyhow::Result<(MeshRoom, Arc<SimMediaDevices>, CallEventStream)> {
    let devices = Arc::new(SimMediaDevices::new());
    let (room, events) = create_room_with(network, config, settings(), devices.clone()).await?;
    Ok((room, devices, events))
}

/// Host "room1" plus one joiner per name, each joined after the previous one
/// settled.
#[allow(dead_code)]
pub async fn create_mesh(
    network: &SimNetwork,
    joiners: &[&str],
) -> anyhow::Result<Vec<(MeshRoom, Arc<SimMediaDevices>, CallEventStream)>> {
    let mut nodes = vec![create_room(network, CallConfig::host("room1", "Hana").with_origin("10.0.0.1")).await?];
    for (i, name) in joiners.iter().enumerate() {
        let config = CallConfig::joiner("room1", *name).with_origin(format!("10.0.0.{}", i + 2));
        nodes.push(create_room(network, config).await?);
        let rooms: Vec<&MeshRoom> = nodes.iter().map(|(room, _, _)| room).collect();
        wait_for_mesh(&rooms, nodes.len()).await?;
    }
    Ok(nodes)
}

/// Waits until every room lists `count` participants, each known by name and
/// with a stream attached.
#[allow(dead_code)]
pub async fn wait_for_mesh(rooms: &[&MeshRoom], count: usize) -> anyhow::Result<()> {
    tokio::time::timeout(WAIT, async {
        loop {
            let mut settled = true;
            for room in rooms {
                let records = room.participants().await?;
                settled &= records.len() == count
                    && records.iter().all(|r| {
                        r.is_local() || (!r.is_placeholder() && r.media_stream.is_some())
                    });
            }
            if settled {
                break;
            }
            tokio::time::sleep(TICK).await;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await?
}

#[allow(dead_code)]
pub async fn wait_for_count(room: &MeshRoom, count: usize) -> anyhow::Result<()> {
    tokio::time::timeout(WAIT, async {
        while room.participants().await?.len() != count {
            tokio::time::sleep(TICK).await;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await?
}

/// Directory keys with the local key swapped for the room's own address.
#[allow(dead_code)]
pub async fn key_set(room: &MeshRoom) -> anyhow::Result<Vec<PeerId>> {
    let own = room.own_address().await?;
    let mut ids: Vec<PeerId> = room
        .participants()
        .await?
        .into_iter()
        .map(|r| if r.id.as_str() == LOCAL_ID { own.clone() } else { r.id })
        .collect();
    ids.sort();
    Ok(ids)
}

#[allow(dead_code)]
pub async fn wait_for_event<F>(events: &mut CallEventStream, mut pred: F) -> anyhow::Result<CallEventKind>
where
    F: FnMut(&CallEventKind) -> bool,
{
    tokio::time::timeout(WAIT, async {
        while let Some(event) = events.next().await {
            if pred(&event) {
                return Ok(event);
            }
        }
        anyhow::bail!("event stream ended")
    })
    .await?
}

/// Everything already queued, plus whatever arrives within a short grace
/// period.
#[allow(dead_code)]
pub async fn drain_events(events: &mut CallEventStream) -> Vec<CallEventKind> {
    let mut out = vec![];
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(100), events.next()).await {
        out.push(event);
    }
    out
}

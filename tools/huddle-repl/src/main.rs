use std::{collections::BTreeMap, time::Duration};

use anyhow::bail;
use clap::Parser;
use futures::StreamExt;
use huddle::{
    call::{Call, CallConfig, CallEventKind, CallEventStream},
    sync::Arc,
};
use huddle_mesh::{
    transport::sim::{SimMediaDevices, SimNetwork},
    MediaPolicy, MeshRoom, MeshSettings,
};
use tokio::task::JoinHandle;

mod logger;

#[derive(Parser, Debug, Eq, PartialEq)]
/// starts the huddle-repl. every node runs in this process over a simulated
/// network
struct Args {
    /// the call id. the host registers under it
    #[clap(long, default_value = "room1")]
    call_id: String,
    /// how long to wait for address registration, in milliseconds
    #[clap(long, default_value_t = 5000)]
    registration_timeout: u64,
    /// leave the call if the camera and microphone can't be opened
    #[clap(long)]
    abort_without_media: bool,
    /// log level: off, error, warn, info, debug or trace
    #[clap(long, default_value = "info")]
    log_level: log::LevelFilter,
}

/// drive several mesh nodes from the command line
#[derive(Parser, Debug, Eq, PartialEq)]
enum Repl {
    /// start the host of the call
    Host {
        name: String,
        #[clap(long)]
        origin: Option<String>,
    },
    /// add a joiner
    Join {
        name: String,
        #[clap(long)]
        origin: Option<String>,
        /// refuse camera and microphone access for this node
        #[clap(long)]
        no_media: bool,
    },
    /// send a chat line from a node
    Chat { node: String, text: Vec<String> },
    /// toggle a node's microphone
    Mute { node: String },
    /// toggle a node's camera
    Video { node: String },
    /// toggle a node's screen share
    Share { node: String },
    /// end a node's screen capture from outside the call
    EndCapture { node: String },
    /// show or hide a node
    Visible {
        node: String,
        #[clap(action = clap::ArgAction::Set)]
        visible: bool,
    },
    /// leave the call cleanly
    Leave { node: String },
    /// drop a node off the network without any teardown
    Crash { node: String },
    /// list the running nodes
    List,
    /// print a node's directory and local media state
    Show { node: String },
    /// leave every call and exit
    Quit,
}

struct Node {
    room: MeshRoom,
    devices: Arc<SimMediaDevices>,
    events: JoinHandle<()>,
}

struct Session {
    call_id: String,
    settings: MeshSettings,
    network: SimNetwork,
    nodes: BTreeMap<String, Node>,
}

impl Session {
    async fn add_node(&mut self, config: CallConfig, no_media: bool) -> anyhow::Result<()> {
        let label = config.display_name.clone();
        if self.nodes.contains_key(&label) {
            bail!("node {label} already exists");
        }
        let devices = Arc::new(SimMediaDevices::new());
        if no_media {
            devices.deny_user_media();
        }
        let mut room = MeshRoom::new(
            config,
            self.settings.clone(),
            Arc::new(self.network.transport()),
            devices.clone(),
        )?;
        let stream = room.get_event_stream().await?;
        let events = tokio::spawn(handle_call_event_stream(label.clone(), stream));
        let address = room.own_address().await?;
        println!("{label} is at {address}");
        self.nodes.insert(
            label,
            Node {
                room,
                devices,
                events,
            },
        );
        Ok(())
    }

    fn node(&mut self, label: &str) -> anyhow::Result<&mut Node> {
        match self.nodes.get_mut(label) {
            Some(node) => Ok(node),
            None => bail!("no node named {label}"),
        }
    }

    fn remove(&mut self, label: &str) -> anyhow::Result<Node> {
        match self.nodes.remove(label) {
            Some(node) => Ok(node),
            None => bail!("no node named {label}"),
        }
    }
}

async fn handle_command(session: &mut Session, cmd: Repl) -> anyhow::Result<()> {
    match cmd {
        Repl::Host { name, origin } => {
            let mut config = CallConfig::host(session.call_id.clone(), name);
            if let Some(origin) = origin {
                config = config.with_origin(origin);
            }
            session.add_node(config, false).await?;
        }
        Repl::Join {
            name,
            origin,
            no_media,
        } => {
            let mut config = CallConfig::joiner(session.call_id.clone(), name);
            if let Some(origin) = origin {
                config = config.with_origin(origin);
            }
            session.add_node(config, no_media).await?;
        }
        Repl::Chat { node, text } => {
            session.node(&node)?.room.send_chat(&text.join(" ")).await?;
        }
        Repl::Mute { node } => {
            let muted = session.node(&node)?.room.toggle_mute().await?;
            println!("{node} muted: {muted}");
        }
        Repl::Video { node } => {
            let video_on = session.node(&node)?.room.toggle_video().await?;
            println!("{node} video on: {video_on}");
        }
        Repl::Share { node } => {
            let sharing = session.node(&node)?.room.toggle_screen_share().await?;
            println!("{node} screen sharing: {sharing}");
        }
        Repl::EndCapture { node } => {
            if !session.node(&node)?.devices.end_screen_capture() {
                bail!("{node} is not capturing a screen");
            }
        }
        Repl::Visible { node, visible } => {
            session.node(&node)?.room.set_visibility(visible).await?;
        }
        Repl::Leave { node } => {
            let mut node = session.remove(&node)?;
            node.room.leave_call().await?;
            // let the final events print
            tokio::time::sleep(Duration::from_millis(100)).await;
            node.events.abort();
        }
        Repl::Crash { node } => {
            let node = session.remove(&node)?;
            let address = node.room.own_address().await?;
            session.network.crash(&address);
            node.events.abort();
        }
        Repl::List => {
            for (label, node) in session.nodes.iter() {
                match node.room.own_address().await {
                    Ok(address) => println!("{label}: {address}"),
                    Err(e) => println!("{label}: {e}"),
                }
            }
        }
        Repl::Quit => {}
        Repl::Show { node } => {
            let room = &session.node(&node)?.room;
            println!("rendezvous: {}", room.rendezvous_status().await?);
            println!("local: {:?}", room.local_state().await?);
            for record in room.participants().await? {
                println!(
                    "  {} {} ({}){}{}",
                    record.id,
                    record.display_name,
                    record.origin_info,
                    if record.is_host { " host" } else { "" },
                    if record.media_stream.is_some() {
                        " streaming"
                    } else {
                        ""
                    },
                );
            }
        }
    }
    Ok(())
}

async fn handle_call_event_stream(label: String, mut stream: CallEventStream) {
    while let Some(evt) = stream.next().await {
        match evt {
            // the directory snapshot is printed by PresenceChanged
            CallEventKind::ParticipantUpdated { .. } => {}
            CallEventKind::ParticipantAdded { record } => {
                println!("[{label}] added {} ({})", record.id, record.display_name);
            }
            CallEventKind::ParticipantRemoved { id } => {
                println!("[{label}] removed {id}");
            }
            CallEventKind::ChatMessage {
                sender,
                text,
                timestamp,
            } => {
                println!("[{label}] {timestamp} <{sender}> {text}");
            }
            CallEventKind::PresenceChanged { count, origins, .. } => {
                println!("[{label}] {count} in call: {}", origins.join(", "));
            }
            CallEventKind::RendezvousStatusChanged { status } => {
                println!("[{label}] rendezvous: {status}");
            }
            CallEventKind::MediaUnavailable { reason } => {
                println!("[{label}] media unavailable: {reason}");
            }
            CallEventKind::LocalMediaChanged { state } => {
                println!("[{label}] local media: {state:?}");
            }
            CallEventKind::CallTerminated => {
                println!("[{label}] call terminated");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_with_level(args.log_level)?;

    let mut settings = MeshSettings::default()
        .with_registration_timeout(Duration::from_millis(args.registration_timeout));
    if args.abort_without_media {
        settings = settings.with_media_policy(MediaPolicy::AbortCall);
    }

    let mut session = Session {
        call_id: args.call_id,
        settings,
        network: SimNetwork::new(),
        nodes: BTreeMap::new(),
    };

    println!("starting REPL");
    println!("enter --help to see available commands");

    let mut iter = std::io::stdin().lines();
    while let Some(Ok(line)) = iter.next() {
        let mut v = vec![""];
        v.extend(line.split_ascii_whitespace());
        let cli = match Repl::try_parse_from(v) {
            Ok(r) => r,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if cli == Repl::Quit {
            break;
        }
        if let Err(e) = handle_command(&mut session, cli).await {
            println!("command failed: {e}");
        }
    }

    for (_, mut node) in std::mem::take(&mut session.nodes) {
        let _ = node.room.leave_call().await;
        node.events.abort();
    }

    Ok(())
}

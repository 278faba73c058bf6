use futures::{channel::oneshot, StreamExt};
use huddle::{
    call::{
        media::MediaTrack, CallConfig, CallEventKind, LocalMediaState, ParticipantRecord, PeerId,
        RendezvousStatus,
    },
    error::Error,
    sync::Arc,
};
use tokio::sync::{
    broadcast,
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Notify,
};
use uuid::Uuid;

use super::data::NotifyWrapper;
use crate::{
    bring_up::MeshCoordinator,
    config::{MediaPolicy, MeshSettings},
    host_media::{LocalMedia, MediaDevices},
    identity,
    transport::Transport,
};

#[derive(Debug)]
enum Cmd {
    GetOwnAddress {
        rsp: oneshot::Sender<PeerId>,
    },
    GetRendezvousStatus {
        rsp: oneshot::Sender<RendezvousStatus>,
    },
    GetParticipants {
        rsp: oneshot::Sender<Vec<ParticipantRecord>>,
    },
    GetLocalState {
        rsp: oneshot::Sender<LocalMediaState>,
    },
    SendChat {
        text: String,
        rsp: oneshot::Sender<Result<(), Error>>,
    },
    ToggleMute {
        rsp: oneshot::Sender<Result<bool, Error>>,
    },
    ToggleVideo {
        rsp: oneshot::Sender<Result<bool, Error>>,
    },
    SetVisibility {
        visible: bool,
        rsp: oneshot::Sender<Result<(), Error>>,
    },
    StartScreenShare {
        rsp: oneshot::Sender<Result<(), Error>>,
    },
    StopScreenShare {
        rsp: oneshot::Sender<Result<(), Error>>,
    },
    LeaveCall {
        rsp: oneshot::Sender<Result<(), Error>>,
    },
}

// results of work that suspended outside the controller task
enum Completion {
    ScreenCaptured {
        result: Result<MediaTrack, Error>,
        rsp: oneshot::Sender<Result<(), Error>>,
    },
    ScreenTrackEnded {
        track_id: Uuid,
    },
    CameraRestored {
        result: Result<MediaTrack, Error>,
        rsp: Option<oneshot::Sender<Result<(), Error>>>,
    },
}

#[derive(Clone)]
pub struct MeshController {
    ch: UnboundedSender<Cmd>,
    notify: Arc<NotifyWrapper>,
}

pub struct Args {
    pub config: CallConfig,
    pub settings: MeshSettings,
    pub transport: Arc<dyn Transport>,
    pub devices: Arc<dyn MediaDevices>,
    pub ui_event_ch: broadcast::Sender<CallEventKind>,
}

impl MeshController {
    pub fn new(args: Args) -> Self {
        let (tx, cmd_rx) = mpsc::unbounded_channel();
        let notify = Arc::new(Notify::new());
        let notify2 = notify.clone();
        tokio::spawn(async move {
            run(args, cmd_rx, notify2).await;
        });
        Self {
            ch: tx,
            notify: Arc::new(NotifyWrapper { notify }),
        }
    }

    async fn request<T>(&self, cmd: impl FnOnce(oneshot::Sender<T>) -> Cmd) -> Result<T, Error> {
        let (tx, rx) = oneshot::channel();
        self.ch.send(cmd(tx)).map_err(|_| Error::CallTerminated)?;
        rx.await.map_err(|_| Error::CallTerminated)
    }

    pub async fn own_address(&self) -> Result<PeerId, Error> {
        self.request(|rsp| Cmd::GetOwnAddress { rsp }).await
    }

    pub async fn rendezvous_status(&self) -> Result<RendezvousStatus, Error> {
        self.request(|rsp| Cmd::GetRendezvousStatus { rsp }).await
    }

    pub async fn participants(&self) -> Result<Vec<ParticipantRecord>, Error> {
        self.request(|rsp| Cmd::GetParticipants { rsp }).await
    }

    pub async fn local_state(&self) -> Result<LocalMediaState, Error> {
        self.request(|rsp| Cmd::GetLocalState { rsp }).await
    }

    pub async fn send_chat(&self, text: String) -> Result<(), Error> {
        self.request(|rsp| Cmd::SendChat { text, rsp }).await?
    }

    pub async fn toggle_mute(&self) -> Result<bool, Error> {
        self.request(|rsp| Cmd::ToggleMute { rsp }).await?
    }

    pub async fn toggle_video(&self) -> Result<bool, Error> {
        self.request(|rsp| Cmd::ToggleVideo { rsp }).await?
    }

    pub async fn set_visibility(&self, visible: bool) -> Result<(), Error> {
        self.request(|rsp| Cmd::SetVisibility { visible, rsp }).await?
    }

    pub async fn start_screen_share(&self) -> Result<(), Error> {
        self.request(|rsp| Cmd::StartScreenShare { rsp }).await?
    }

    pub async fn stop_screen_share(&self) -> Result<(), Error> {
        self.request(|rsp| Cmd::StopScreenShare { rsp }).await?
    }

    pub async fn leave_call(&self) -> Result<(), Error> {
        self.request(|rsp| Cmd::LeaveCall { rsp }).await?
    }
}

fn spawn_camera(
    devices: &Arc<dyn MediaDevices>,
    done_tx: &UnboundedSender<Completion>,
    rsp: Option<oneshot::Sender<Result<(), Error>>>,
) {
    let devices = devices.clone();
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let result = devices.camera_track().await;
        let _ = done_tx.send(Completion::CameraRestored { result, rsp });
    });
}

fn watch_screen_track(track: MediaTrack, done_tx: &UnboundedSender<Completion>) {
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        track.ended().await;
        let _ = done_tx.send(Completion::ScreenTrackEnded {
            track_id: track.id(),
        });
    });
}

async fn run(args: Args, mut cmd_rx: UnboundedReceiver<Cmd>, notify: Arc<Notify>) {
    let Args {
        config,
        settings,
        transport,
        devices,
        ui_event_ch,
    } = args;

    let mut transport_events = match transport.event_stream() {
        Ok(r) => r,
        Err(e) => {
            log::error!("failed to get transport event stream. quitting mesh controller: {e}");
            return;
        }
    };

    let own = identity::resolve_address(&config);
    let startup = async {
        let status =
            identity::rendezvous(transport.as_ref(), &own, settings.registration_timeout).await;
        let _ = ui_event_ch.send(CallEventKind::RendezvousStatusChanged {
            status: status.clone(),
        });
        let stream = match devices.user_media().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::error!("failed to acquire local media: {e}");
                let _ = ui_event_ch.send(CallEventKind::MediaUnavailable {
                    reason: e.to_string(),
                });
                None
            }
        };
        (status, stream)
    };
    let (status, stream) = tokio::select! {
        _ = notify.notified() => {
            log::debug!("call dropped during startup");
            transport.shutdown();
            return;
        },
        r = startup => r,
    };

    let has_media = stream.is_some();
    let abort = !has_media && settings.media_policy == MediaPolicy::AbortCall;
    let mut coordinator = MeshCoordinator::new(
        own,
        config,
        settings,
        transport.clone(),
        LocalMedia::new(stream),
        ui_event_ch,
    );
    if abort {
        log::warn!("no local media, aborting call");
        coordinator.terminate();
        return;
    }
    coordinator.start(status.is_online());

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let mut screen_pending = false;
    let mut camera_pending = false;

    loop {
        tokio::select! {
            _ = notify.notified() => {
                log::debug!("quitting mesh controller");
                break;
            },
            opt = cmd_rx.recv() => {
                let cmd = match opt {
                    Some(r) => r,
                    None => {
                        log::debug!("mesh controller cmd_rx channel is closed. quitting");
                        break;
                    }
                };
                match cmd {
                    Cmd::GetOwnAddress { rsp } => {
                        let _ = rsp.send(coordinator.own_address().clone());
                    }
                    Cmd::GetRendezvousStatus { rsp } => {
                        let _ = rsp.send(status.clone());
                    }
                    Cmd::GetParticipants { rsp } => {
                        let _ = rsp.send(coordinator.participants());
                    }
                    Cmd::GetLocalState { rsp } => {
                        let _ = rsp.send(coordinator.local_state());
                    }
                    Cmd::SendChat { text, rsp } => {
                        let _ = rsp.send(coordinator.send_chat(&text));
                    }
                    Cmd::ToggleMute { rsp } => {
                        let _ = rsp.send(coordinator.toggle_mute());
                    }
                    Cmd::ToggleVideo { rsp } => {
                        let _ = rsp.send(coordinator.toggle_video());
                    }
                    Cmd::SetVisibility { visible, rsp } => {
                        let _ = rsp.send(coordinator.set_visibility(visible));
                    }
                    Cmd::StartScreenShare { rsp } => {
                        if screen_pending {
                            let _ = rsp.send(Err(Error::ScreenShareActive));
                            continue;
                        }
                        if let Err(e) = coordinator.can_start_screen_share() {
                            let _ = rsp.send(Err(e));
                            continue;
                        }
                        screen_pending = true;
                        let devices = devices.clone();
                        let done_tx = done_tx.clone();
                        tokio::spawn(async move {
                            let result = devices.display_media().await;
                            let _ = done_tx.send(Completion::ScreenCaptured { result, rsp });
                        });
                    }
                    Cmd::StopScreenShare { rsp } => {
                        if camera_pending {
                            // already on its way back to the camera
                            let _ = rsp.send(Ok(()));
                            continue;
                        }
                        if !coordinator.local_state().screen_sharing {
                            let _ = rsp.send(Err(Error::ScreenShareInactive));
                            continue;
                        }
                        camera_pending = true;
                        spawn_camera(&devices, &done_tx, Some(rsp));
                    }
                    Cmd::LeaveCall { rsp } => {
                        coordinator.terminate();
                        let _ = rsp.send(Ok(()));
                        break;
                    }
                }
            },
            opt = done_rx.recv() => {
                let done = match opt {
                    Some(r) => r,
                    None => continue,
                };
                // the call may have moved on while these were suspended
                match done {
                    Completion::ScreenCaptured { result, rsp } => {
                        screen_pending = false;
                        let track = match result {
                            Ok(track) => track,
                            Err(e) => {
                                let _ = rsp.send(Err(e));
                                continue;
                            }
                        };
                        match coordinator.begin_screen_share(track.clone()) {
                            Ok(_) => {
                                watch_screen_track(track, &done_tx);
                                let _ = rsp.send(Ok(()));
                            }
                            Err(e) => {
                                track.stop();
                                let _ = rsp.send(Err(e));
                            }
                        }
                    }
                    Completion::ScreenTrackEnded { track_id } => {
                        if camera_pending || coordinator.screen_track_id() != Some(track_id) {
                            continue;
                        }
                        log::debug!("screen capture ended, reverting to camera");
                        camera_pending = true;
                        spawn_camera(&devices, &done_tx, None);
                    }
                    Completion::CameraRestored { result, rsp } => {
                        camera_pending = false;
                        let camera = match result {
                            Ok(camera) => Some(camera),
                            Err(e) => {
                                log::error!("failed to reacquire camera: {e}");
                                None
                            }
                        };
                        let r = if coordinator.local_state().screen_sharing {
                            coordinator.end_screen_share(camera)
                        } else {
                            if let Some(camera) = camera {
                                camera.stop();
                            }
                            Ok(())
                        };
                        match rsp {
                            Some(rsp) => {
                                let _ = rsp.send(r);
                            }
                            None => {
                                if let Err(e) = r {
                                    log::error!("failed to stop screen share: {e}");
                                }
                            }
                        }
                    }
                }
            },
            opt = transport_events.next() => {
                let event = match opt {
                    Some(r) => r,
                    None => {
                        log::warn!("transport event stream closed. leaving call");
                        break;
                    }
                };
                coordinator.handle_event(event);
            }
        }
    }

    coordinator.terminate();
}

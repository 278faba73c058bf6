mod data;
mod mesh_controller;

use async_trait::async_trait;
use huddle::{
    call::{
        Call, CallConfig, CallEventKind, CallEventStream, LocalMediaState, ParticipantRecord,
        PeerId, RendezvousStatus,
    },
    error::Error,
    module::Module,
    sync::Arc,
    Extension,
};
use tokio::sync::broadcast;

use self::mesh_controller::{Args, MeshController};
use crate::{config::MeshSettings, host_media::MediaDevices, transport::Transport};

// implements Call
#[derive(Clone)]
pub struct MeshRoom {
    controller: MeshController,
    ui_event_ch: broadcast::Sender<CallEventKind>,
}

impl MeshRoom {
    /// Enters the call described by `config`. Rendezvous and media
    /// acquisition run in the background; requests made meanwhile are served
    /// once they finish. Must be called from within a tokio runtime.
    pub fn new(
        config: CallConfig,
        settings: MeshSettings,
        transport: Arc<dyn Transport>,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<Self, Error> {
        config.validate()?;
        log::trace!("entering call {} as {}", config.call_id, config.display_name);
        let (ui_event_ch, _rx) = broadcast::channel(settings.event_channel_capacity);
        let controller = MeshController::new(Args {
            config,
            settings,
            transport,
            devices,
            ui_event_ch: ui_event_ch.clone(),
        });
        Ok(Self {
            controller,
            ui_event_ch,
        })
    }
}

impl Extension for MeshRoom {
    fn id(&self) -> String {
        "huddle-mesh".into()
    }

    fn name(&self) -> String {
        "Huddle Mesh".into()
    }

    fn module(&self) -> Module {
        Module::Media
    }
}

#[async_trait]
impl Call for MeshRoom {
    async fn get_event_stream(&mut self) -> Result<CallEventStream, Error> {
        let mut rx = self.ui_event_ch.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(_) => {}
                };
            }
        };
        Ok(CallEventStream(Box::pin(stream)))
    }

    async fn own_address(&self) -> Result<PeerId, Error> {
        self.controller.own_address().await
    }

    async fn rendezvous_status(&self) -> Result<RendezvousStatus, Error> {
        self.controller.rendezvous_status().await
    }

    async fn participants(&self) -> Result<Vec<ParticipantRecord>, Error> {
        self.controller.participants().await
    }

    async fn send_chat(&mut self, text: &str) -> Result<(), Error> {
        self.controller.send_chat(text.to_string()).await
    }

    async fn local_state(&self) -> Result<LocalMediaState, Error> {
        self.controller.local_state().await
    }

    async fn toggle_mute(&mut self) -> Result<bool, Error> {
        self.controller.toggle_mute().await
    }

    async fn toggle_video(&mut self) -> Result<bool, Error> {
        self.controller.toggle_video().await
    }

    async fn start_screen_share(&mut self) -> Result<(), Error> {
        self.controller.start_screen_share().await
    }

    async fn stop_screen_share(&mut self) -> Result<(), Error> {
        self.controller.stop_screen_share().await
    }

    async fn toggle_screen_share(&mut self) -> Result<bool, Error> {
        if self.controller.local_state().await?.screen_sharing {
            self.controller.stop_screen_share().await?;
            Ok(false)
        } else {
            self.controller.start_screen_share().await?;
            Ok(true)
        }
    }

    async fn set_visibility(&mut self, visible: bool) -> Result<(), Error> {
        self.controller.set_visibility(visible).await
    }

    async fn leave_call(&mut self) -> Result<(), Error> {
        self.controller.leave_call().await
    }
}

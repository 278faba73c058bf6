/// Errors shared by the call traits and their extensions
use thiserror::Error;

use crate::call::PeerId;

#[derive(Error, Debug)]
pub enum Error {
    //Configuration Errors
    #[error("Call configuration is invalid: {_0}")]
    InvalidConfig(String),

    //Rendezvous Errors
    #[error("Rendezvous failed: {_0}")]
    RendezvousFailed(String),
    #[error("Address registration timed out")]
    RegistrationTimeout,
    #[error("Address {_0} is already registered")]
    AddressUnavailable(PeerId),
    #[error("Mesh is offline")]
    MeshOffline,

    //Link Errors
    #[error("Peer {_0} is unavailable")]
    PeerUnavailable(PeerId),
    #[error("Link not found")]
    LinkNotFound,
    #[error("Link is not open")]
    LinkNotOpen,
    #[error("You cannot connect to yourself")]
    SelfConnect,
    #[error("Transport is shut down")]
    TransportClosed,

    //Call Errors
    #[error("CallNotInProgress")]
    CallNotInProgress,
    #[error("CallTerminated")]
    CallTerminated,
    #[error("Media is unavailable: {_0}")]
    MediaUnavailable(String),
    #[error("Screen share is already active")]
    ScreenShareActive,
    #[error("Screen share is not active")]
    ScreenShareInactive,

    //Message Errors
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Envelope is malformed: {_0}")]
    MalformedEnvelope(String),

    //Misc
    #[error("{0}")]
    OtherWithContext(String),
    #[error("Sender Channel Unavailable")]
    SenderChannelUnavailable,
    #[error("Receiver Channel Unavailable")]
    ReceiverChannelUnavailable,
    #[error("{0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("{0}")]
    TomlError(#[from] toml::de::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
    #[error("{0}")]
    IoError(#[from] std::io::Error),
    #[error("Functionality is not yet implemented")]
    Unimplemented,
    #[error("An unknown error has occurred")]
    Other,
}

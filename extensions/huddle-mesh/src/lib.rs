//! A `Call` implementation that runs a full mesh: every participant holds one
//! data link and one media link to every other participant.
//!
//! The host only serves as the rendezvous point. Joiners dial it first, learn
//! the current participant list from it and then link to everyone directly,
//! so media never flows through the host.
//!
//! [`MeshRoom::new`] spawns one controller task per call. That task owns all
//! of the call's state and is the only place it is mutated.
//!

pub mod bring_up;
pub mod config;
pub mod directory;
pub mod host_media;
pub mod identity;
pub mod links;
pub mod message_bus;
mod mesh_impl;
pub mod signaling;
pub mod transport;

pub use config::{MediaPolicy, MeshSettings};
pub use host_media::MediaDevices;
pub use mesh_impl::MeshRoom;
pub use transport::Transport;

use std::time::Duration;

use huddle::{
    call::{CallConfig, PeerId, RendezvousStatus},
    error::Error,
};
use rand::{distributions::Alphanumeric, Rng};

use crate::transport::Transport;

const JOINER_PREFIX: &str = "participant_";
const TOKEN_LEN: usize = 9;

/// The host is reachable at the call id. A joiner uses its configured address
/// or a fresh random one.
pub fn resolve_address(config: &CallConfig) -> PeerId {
    if config.is_host {
        return PeerId::new(config.call_id.clone());
    }
    match &config.address {
        Some(address) => address.clone(),
        None => generate_address(),
    }
}

pub fn generate_address() -> PeerId {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    PeerId::new(format!("{JOINER_PREFIX}{token}"))
}

/// Registers `address`, giving up after `timeout`. Neither outcome is fatal:
/// anything but `Connected` means the node runs without the mesh.
pub async fn rendezvous(
    transport: &dyn Transport,
    address: &PeerId,
    timeout: Duration,
) -> RendezvousStatus {
    match tokio::time::timeout(timeout, transport.register(address)).await {
        Ok(Ok(())) => {
            log::info!("registered as {address}");
            RendezvousStatus::Connected
        }
        Ok(Err(e)) => {
            log::error!("failed to register {address}: {e}");
            RendezvousStatus::Failed(e.to_string())
        }
        Err(_) => {
            log::warn!("{}: {address}", Error::RegistrationTimeout);
            RendezvousStatus::Offline
        }
    }
}

//! Typed envelope traffic over data links.

use huddle::call::{ParticipantSummary, PeerId};

use crate::{links::LinkManager, signaling::Envelope, transport::LinkId};

/// Where a received envelope came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub link: LinkId,
    pub remote: PeerId,
}

/// One handler per envelope kind.
pub trait EnvelopeHandler {
    fn on_join(&mut self, from: &Origin, participant: ParticipantSummary);
    fn on_list_request(&mut self, from: &Origin);
    fn on_list_response(&mut self, from: &Origin, records: Vec<ParticipantSummary>);
    fn on_announce(&mut self, from: &Origin, participant: ParticipantSummary);
    fn on_chat(&mut self, from: &Origin, display_name: String, text: String, timestamp: String);
}

/// Decodes `payload` and routes it by kind. Unknown kinds and malformed
/// payloads are dropped.
pub fn dispatch<H: EnvelopeHandler>(handler: &mut H, from: &Origin, payload: &[u8]) {
    let envelope = match Envelope::decode(payload) {
        Ok(Some(envelope)) => envelope,
        Ok(None) => return,
        Err(e) => {
            log::warn!("dropping envelope from {}: {e}", from.remote);
            return;
        }
    };
    log::trace!("{envelope} from {}", from.remote);

    match envelope {
        Envelope::Join {
            id,
            display_name,
            origin_info,
        } => {
            if id != from.remote {
                log::warn!("dropping join naming {id} received from {}", from.remote);
                return;
            }
            handler.on_join(
                from,
                ParticipantSummary {
                    id,
                    display_name,
                    origin_info,
                    is_host: false,
                },
            );
        }
        Envelope::ListRequest => handler.on_list_request(from),
        Envelope::ListResponse { records } => handler.on_list_response(from, records),
        Envelope::AnnounceNewParticipant { participant } => handler.on_announce(from, participant),
        Envelope::Chat {
            display_name,
            text,
            timestamp,
        } => handler.on_chat(from, display_name, text, timestamp),
    }
}

/// Sends on one link. Returns false, without raising, if the link is not open
/// or the envelope could not be sent.
pub fn send(links: &LinkManager, link: LinkId, envelope: &Envelope) -> bool {
    let payload = match envelope.encode() {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("failed to encode {envelope}: {e}");
            return false;
        }
    };
    match links.send(link, payload) {
        Ok(_) => true,
        Err(e) => {
            log::debug!("{envelope} not sent on {link}: {e}");
            false
        }
    }
}

/// Sends on every open data link except the one to `exclude`. Returns the
/// number of links the envelope went out on.
pub fn broadcast(links: &LinkManager, envelope: &Envelope, exclude: Option<&PeerId>) -> usize {
    let payload = match envelope.encode() {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("failed to encode {envelope}: {e}");
            return 0;
        }
    };
    let mut sent = 0;
    for (link, remote) in links.open_data_links() {
        if Some(&remote) == exclude {
            continue;
        }
        match links.send(link, payload.clone()) {
            Ok(_) => sent += 1,
            Err(e) => log::debug!("{envelope} not sent to {remote}: {e}"),
        }
    }
    sent
}

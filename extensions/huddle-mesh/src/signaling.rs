use derive_more::Display;
use huddle::{
    call::{ParticipantSummary, PeerId},
    error::Error,
};
use serde::{Deserialize, Serialize};

/// Application messages carried over data links.
#[derive(Serialize, Deserialize, Display, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Envelope {
    /// sent by the dialer as soon as its data link opens
    #[display(fmt = "Join")]
    #[serde(rename_all = "camelCase")]
    Join {
        id: PeerId,
        display_name: String,
        #[serde(default)]
        origin_info: String,
    },
    /// sent by a joiner to the host only
    #[display(fmt = "ListRequest")]
    ListRequest,
    #[display(fmt = "ListResponse")]
    ListResponse { records: Vec<ParticipantSummary> },
    // host fan-out of a new join
    #[display(fmt = "AnnounceNewParticipant")]
    AnnounceNewParticipant { participant: ParticipantSummary },
    #[display(fmt = "Chat")]
    #[serde(rename_all = "camelCase")]
    Chat {
        display_name: String,
        text: String,
        timestamp: String,
    },
}

const KINDS: [&str; 5] = [
    "join",
    "list-request",
    "list-response",
    "announce-new-participant",
    "chat",
];

impl Envelope {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    /// `Ok(None)` for a well-formed envelope of a kind we do not know.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, Error> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| Error::MalformedEnvelope("missing kind".into()))?;
        if !KINDS.contains(&kind) {
            log::debug!("ignoring envelope of unknown kind {kind}");
            return Ok(None);
        }
        let envelope: Self =
            serde_json::from_value(value).map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(Some(envelope))
    }

    fn validate(&self) -> Result<(), Error> {
        let invalid = |id: &PeerId| id.is_empty() || id.is_reserved();
        let bad_id = match self {
            Envelope::Join { id, .. } => invalid(id),
            Envelope::ListResponse { records } => records.iter().any(|r| invalid(&r.id)),
            Envelope::AnnounceNewParticipant { participant } => invalid(&participant.id),
            Envelope::ListRequest | Envelope::Chat { .. } => false,
        };
        if bad_id {
            return Err(Error::MalformedEnvelope(format!(
                "{self} names an empty or reserved id"
            )));
        }
        Ok(())
    }
}

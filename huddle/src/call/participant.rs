use serde::{Deserialize, Serialize};

use super::{media::MediaStream, PeerId};

/// Reserved directory key of the node's own record. Never a mesh address.
pub const LOCAL_ID: &str = "local";

/// Origin used when nothing is known about where a participant connects from.
pub const UNKNOWN_ORIGIN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    pub id: PeerId,
    pub display_name: String,
    pub origin_info: String,
    pub is_host: bool,
    pub media_stream: Option<MediaStream>,
    pub muted: bool,
    pub video_on: bool,
}

impl ParticipantRecord {
    pub fn new(id: PeerId, display_name: impl Into<String>, origin_info: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            origin_info: origin_info.into(),
            is_host: false,
            media_stream: None,
            muted: false,
            video_on: true,
        }
    }

    /// Minimal record for a participant first seen through its media stream.
    pub fn placeholder(id: PeerId, stream: MediaStream) -> Self {
        let name = id.placeholder_name();
        Self {
            media_stream: Some(stream),
            ..Self::new(id, name, UNKNOWN_ORIGIN)
        }
    }

    pub fn with_host(mut self, is_host: bool) -> Self {
        self.is_host = is_host;
        self
    }

    pub fn is_local(&self) -> bool {
        self.id.as_str() == LOCAL_ID
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin_info == UNKNOWN_ORIGIN && self.display_name == self.id.placeholder_name()
    }

    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            origin_info: self.origin_info.clone(),
            is_host: self.is_host,
        }
    }
}

/// The serializable part of a record, as carried by `list-response` and
/// `announce-new-participant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: PeerId,
    pub display_name: String,
    #[serde(default)]
    pub origin_info: String,
    #[serde(default)]
    pub is_host: bool,
}

impl From<ParticipantSummary> for ParticipantRecord {
    fn from(value: ParticipantSummary) -> Self {
        ParticipantRecord::new(value.id, value.display_name, value.origin_info).with_host(value.is_host)
    }
}

/// Local toggle state of the node's own media.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMediaState {
    pub muted: bool,
    pub video_on: bool,
    pub screen_sharing: bool,
    pub visible: bool,
    pub has_media: bool,
}

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// `Media` - Audio/video calls between participants of a mesh.
///
/// `Messaging` - Lightweight messages (chat, presence) riding on the call's data links.
///
#[derive(Hash, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Display, Default)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    /// Represents media such as audio/video calls
    #[display(fmt = "media")]
    Media,

    /// Chat and presence over data links
    #[display(fmt = "messaging")]
    Messaging,

    /// Unknown module. Should be used by default where a module cannot be identified for any specific reason.
    #[default]
    #[display(fmt = "unknown")]
    Unknown,
}

use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::LOCAL_ID;

/// Mesh address of a participant. Unique per node for the lifetime of a call.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The key of the local record. Never a mesh address.
    pub fn is_reserved(&self) -> bool {
        self.0 == LOCAL_ID
    }

    /// Label used for participants we only know through their media stream.
    pub fn placeholder_name(&self) -> String {
        let short: String = self.0.chars().take(6).collect();
        format!("Participant {short}")
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// What to do when local capture cannot be acquired at startup.
#[derive(Default, Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPolicy {
    /// stay in the call without sending audio/video
    #[default]
    #[display(fmt = "continue without media")]
    ContinueWithoutMedia,
    #[display(fmt = "abort call")]
    AbortCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// upper bound on address registration before falling back to offline mode
    #[serde(with = "duration_ms")]
    pub registration_timeout: Duration,
    pub media_policy: MediaPolicy,
    pub event_channel_capacity: usize,
    /// sender name used for join/leave chat lines
    pub system_sender: String,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            registration_timeout: Duration::from_secs(5),
            media_policy: MediaPolicy::default(),
            event_channel_capacity: 1024,
            system_sender: "System".into(),
        }
    }
}

impl MeshSettings {
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn with_media_policy(mut self, policy: MediaPolicy) -> Self {
        self.media_policy = policy;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{PeerId, LOCAL_ID};
use crate::error::Error;

/// Call-scoped configuration, consumed once when a node enters a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallConfig {
    /// shared call identifier. doubles as the host's mesh address
    pub call_id: String,
    pub is_host: bool,
    #[serde(alias = "selfDisplayName")]
    pub display_name: String,
    /// defaults to `call_id` when absent
    #[serde(default)]
    pub host_address: Option<PeerId>,
    #[serde(default)]
    pub origin_info: String,
    /// explicit mesh address for a joining node. ignored for the host
    #[serde(default)]
    pub address: Option<PeerId>,
}

impl CallConfig {
    pub fn host(call_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            is_host: true,
            display_name: display_name.into(),
            host_address: None,
            origin_info: String::new(),
            address: None,
        }
    }

    pub fn joiner(call_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_host: false,
            ..Self::host(call_id, display_name)
        }
    }

    pub fn with_origin(mut self, origin_info: impl Into<String>) -> Self {
        self.origin_info = origin_info.into();
        self
    }

    pub fn with_host_address(mut self, host_address: impl Into<PeerId>) -> Self {
        self.host_address = Some(host_address.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<PeerId>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// The rendezvous point every joiner dials first.
    pub fn host_address(&self) -> PeerId {
        self.host_address
            .clone()
            .unwrap_or_else(|| PeerId::new(self.call_id.clone()))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.call_id.trim().is_empty() {
            return Err(Error::InvalidConfig("call id is empty".into()));
        }
        if self.display_name.trim().is_empty() {
            return Err(Error::InvalidConfig("display name is empty".into()));
        }
        if matches!(&self.address, Some(address) if address.is_empty()) {
            return Err(Error::InvalidConfig("address is empty".into()));
        }
        if !self.is_host && self.host_address().is_empty() {
            return Err(Error::InvalidConfig("host address is empty".into()));
        }
        let reserved = PeerId::new(self.call_id.clone()).is_reserved()
            || self.host_address().is_reserved()
            || matches!(&self.address, Some(address) if address.is_reserved());
        if reserved {
            return Err(Error::InvalidConfig(format!(
                "\"{LOCAL_ID}\" is reserved for the local record"
            )));
        }
        Ok(())
    }

    pub fn from_json(data: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(data: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&data),
            _ => Self::from_json(&data),
        }
    }
}

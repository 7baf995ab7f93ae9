//! Device identities.
//!
//! A connected client is named by a stable identifier (a UPnP `uuid:` token
//! or similar) and/or the network address it connected from. Addresses are
//! volatile under DHCP and NAT, so once a stable id is known it wins.

use std::fmt;

/// The pair of names a playback client can be known by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// Persistent device identifier, once the protocol layer has reported one.
    pub stable_id: Option<String>,
    /// Network address the client connected from.
    pub address: Option<String>,
}

impl DeviceIdentity {
    /// Identity known only by its network address (a placeholder client).
    pub fn from_address(address: impl Into<String>) -> Self {
        Self {
            stable_id: None,
            address: Some(normalize(address.into())),
        }
    }

    /// Identity known only by its stable identifier.
    pub fn from_stable_id(id: impl Into<String>) -> Self {
        Self {
            stable_id: Some(normalize(id.into())),
            address: None,
        }
    }

    /// Identity with both names set.
    pub fn new(stable_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            stable_id: Some(normalize(stable_id.into())),
            address: Some(normalize(address.into())),
        }
    }

    /// Returns a copy with the stable id replaced.
    pub fn with_stable_id(&self, id: impl Into<String>) -> Self {
        Self {
            stable_id: Some(normalize(id.into())),
            address: self.address.clone(),
        }
    }

    /// Whether neither name is set.
    pub fn is_empty(&self) -> bool {
        self.stable_id.is_none() && self.address.is_none()
    }

    /// Whether the stable identifier has been learned.
    pub fn is_confirmed(&self) -> bool {
        self.stable_id.is_some()
    }

    /// The preferred lookup key: stable id first, then address.
    pub fn primary(&self) -> Option<&str> {
        self.stable_id.as_deref().or(self.address.as_deref())
    }

    /// Both names, stable id first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.stable_id
            .as_deref()
            .into_iter()
            .chain(self.address.as_deref())
    }

    /// Whether either name is in `ids`.
    pub fn matches_any<'a>(&self, mut ids: impl Iterator<Item = &'a String>) -> bool {
        ids.any(|id| self.keys().any(|k| k == id))
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.stable_id, &self.address) {
            (Some(id), Some(addr)) => write!(f, "{id} ({addr})"),
            (Some(id), None) => write!(f, "{id}"),
            (None, Some(addr)) => write!(f, "{addr}"),
            (None, None) => write!(f, "<unidentified>"),
        }
    }
}

fn normalize(s: String) -> String {
    let trimmed = s.trim();
    if trimmed.len() == s.len() {
        s
    } else {
        trimmed.to_string()
    }
}

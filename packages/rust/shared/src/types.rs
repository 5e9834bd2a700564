//! Core domain types for relayscout runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RelayScoutError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A relay address in `host:port` form.
///
/// Ordering is plain string ordering, which is what the persisted
/// validated-endpoints file is sorted by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(String);

impl Endpoint {
    /// The full `host:port` address.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare host, without the port.
    pub fn host(&self) -> &str {
        // Construction guarantees a ':' separator.
        self.0.rsplit_once(':').map_or(&self.0, |(host, _)| host)
    }

    /// The port component, as written.
    pub fn port(&self) -> &str {
        self.0.rsplit_once(':').map_or("", |(_, port)| port)
    }
}

impl FromStr for Endpoint {
    type Err = RelayScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((host, port)) = s.rsplit_once(':') else {
            return Err(RelayScoutError::validation(format!(
                "endpoint '{s}' is missing a port"
            )));
        };
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(RelayScoutError::validation(format!(
                "endpoint '{s}' has an invalid host"
            )));
        }
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RelayScoutError::validation(format!(
                "endpoint '{s}' has a non-numeric port"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = RelayScoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Channel template / playlist
// ---------------------------------------------------------------------------

/// One line of a channel template: `name,scheme://group:port/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelEntry {
    /// Display name of the channel.
    pub name: String,
    /// Multicast stream locator, e.g. `rtp://239.77.0.1:5146`.
    pub stream_url: String,
}

/// Relay path segment a multicast locator is rewritten to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamProtocol {
    Rtp,
    Udp,
}

impl StreamProtocol {
    /// Pick the relay segment for a locator scheme. `rtp` maps to `rtp`,
    /// every other scheme is relayed as `udp`.
    pub fn from_scheme(scheme: &str) -> Self {
        if scheme.eq_ignore_ascii_case("rtp") {
            Self::Rtp
        } else {
            Self::Udp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rtp => "rtp",
            Self::Udp => "udp",
        }
    }
}

/// A playlist line pointing a channel at a validated relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistEntry {
    pub name: String,
    pub url: String,
}

impl fmt::Display for PlaylistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.name, self.url)
    }
}

//! Outcome types for geo and liveness checks.

use std::fmt;

// ---------------------------------------------------------------------------
// Geo
// ---------------------------------------------------------------------------

/// Result of looking a host up in the geolocation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoVerdict {
    /// Region and ISP both match the target.
    Match { region: String, isp: String },
    /// Lookup succeeded but the host is elsewhere or on another network.
    Mismatch { region: String, isp: String },
    /// The service answered with a non-`success` status.
    Rejected { status: String },
    /// Transport or decoding failure. Treated exactly like a mismatch.
    Unavailable { reason: String },
}

impl GeoVerdict {
    /// Whether the host passes the geo filter.
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }
}

impl fmt::Display for GeoVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match { region, isp } => write!(f, "match ({region}, {isp})"),
            Self::Mismatch { region, isp } => write!(f, "mismatch ({region}, {isp})"),
            Self::Rejected { status } => write!(f, "rejected by service (status {status})"),
            Self::Unavailable { reason } => write!(f, "lookup failed: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Why a single status path did not prove the relay alive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    /// Any status other than exactly 200, redirects included.
    #[error("HTTP {0}")]
    Status(u16),

    /// 200, but the page looks like something other than a relay status page.
    #[error("no status keyword in body")]
    MissingKeyword,

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("{0}")]
    Other(String),
}

/// One path tried against a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    pub path: String,
    pub failure: ProbeFailure,
}

/// Result of probing a relay's status paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// The first path that answered like a relay status page.
    Alive { path: String },
    /// Every path failed; attempts are in the order they were tried.
    ///
    /// Timeouts and confirmed-dead responses are not distinguished in the
    /// verdict itself, only in the recorded attempts.
    Dead { attempts: Vec<ProbeAttempt> },
}

impl LivenessVerdict {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive { .. })
    }
}

impl fmt::Display for LivenessVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive { path } => write!(f, "alive via {path}"),
            Self::Dead { attempts } => {
                f.write_str("dead")?;
                for (i, a) in attempts.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{} {}", a.path, a.failure)?;
                }
                Ok(())
            }
        }
    }
}

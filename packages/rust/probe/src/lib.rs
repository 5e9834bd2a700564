//! Per-endpoint checks: geolocation filtering and relay liveness probing.
//!
//! This crate provides:
//! - [`GeoValidator`]: region + ISP predicate over a geolocation service
//! - [`LivenessProber`]: status-page probe with a body keyword heuristic
//! - [`GeoVerdict`] / [`LivenessVerdict`]: explicit outcomes that keep the
//!   reason a check failed, instead of a bare boolean
//!
//! Neither check ever returns an error for a misbehaving remote: an
//! unreachable or garbled service is a negative verdict.

pub mod geo;
pub mod liveness;
pub mod verdict;

pub use geo::{GeoOptions, GeoValidator};
pub use liveness::{LivenessOptions, LivenessProber};
pub use verdict::{GeoVerdict, LivenessVerdict, ProbeAttempt, ProbeFailure};

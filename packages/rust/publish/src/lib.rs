//! Publishing generated artifacts and notifying downstream automation.
//!
//! - [`ArtifactSink`]: where generated files go once a run succeeds
//!   ([`GitSink`] commits and pushes, [`NoopSink`] only records)
//! - [`trigger_workflow`]: workflow-dispatch call with a single branch fallback

pub mod sink;
pub mod trigger;

pub use sink::{ArtifactSink, GitSink, NoopSink, PublishOutcome};
pub use trigger::{TriggerOptions, TriggerOutcome, trigger_workflow};

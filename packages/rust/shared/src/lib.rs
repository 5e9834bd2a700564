//! Shared types, error model, and configuration for relayscout.
//!
//! This crate is the foundation depended on by all other relayscout crates.
//! It provides:
//! - [`RelayScoutError`]: the unified error type
//! - Domain types ([`Endpoint`], [`ChannelEntry`], [`PlaylistEntry`], [`RunId`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GeoConfig, MAX_PROBE_WORKERS, OutputConfig, ProbeConfig, PublishConfig,
    SearchConfig, TriggerConfig, config_dir, config_file_path, env_credential, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{RelayScoutError, Result};
pub use types::{ChannelEntry, Endpoint, PlaylistEntry, RunId, StreamProtocol};

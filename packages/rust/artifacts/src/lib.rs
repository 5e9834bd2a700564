//! Flat-file artifacts: the channel template going in, the validated
//! endpoint list and playlist coming out.
//!
//! - [`template`]: parse and load the channel template
//! - [`playlist`]: rewrite template entries onto validated relays
//! - [`files`]: overwrite-only writers and the endpoints file reader

pub mod files;
pub mod playlist;
pub mod template;

pub use files::{read_endpoints, write_endpoints, write_playlist};
pub use playlist::{build_playlist, rewrite_entry};
pub use template::ChannelTemplate;

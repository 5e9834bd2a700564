//! Channel template parsing.
//!
//! One entry per line, `name,scheme://group:port[/...]`. Lines without a
//! comma (headers, blanks, comments) are skipped silently; the stream URL is
//! everything after the first comma.

use std::path::Path;

use relayscout_shared::{ChannelEntry, RelayScoutError, Result};
use tracing::{debug, instrument};

/// A parsed channel template. Read-only input, never written back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelTemplate {
    pub entries: Vec<ChannelEntry>,
}

impl ChannelTemplate {
    /// Parse template text.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter_map(|line| line.split_once(','))
            .map(|(name, stream_url)| ChannelEntry {
                name: name.to_string(),
                stream_url: stream_url.to_string(),
            })
            .collect();

        Self { entries }
    }

    /// Load a template from disk. A missing file is `Ok(None)`, so the caller
    /// can skip assembly without failing the run.
    #[instrument]
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RelayScoutError::io(path, e)),
        };

        let template = Self::parse(&content);
        debug!(entries = template.len(), "template loaded");
        Ok(Some(template))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

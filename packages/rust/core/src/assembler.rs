//! Assembly stage: playlist file from validated relays and the channel template.

use std::path::{Path, PathBuf};

use relayscout_artifacts::{ChannelTemplate, build_playlist, write_playlist};
use relayscout_shared::{Endpoint, Result};
use tracing::{info, instrument, warn};

/// Output from the assembly stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// The playlist file was overwritten.
    Written { path: PathBuf, entries: usize },
    /// No template on disk; nothing was generated.
    TemplateMissing { path: PathBuf },
    /// The template produced no stream entries; the playlist file was left alone.
    Empty,
}

impl AssemblyOutcome {
    /// The playlist path, when one was written.
    pub fn written_path(&self) -> Option<&Path> {
        match self {
            Self::Written { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Build and write the playlist.
///
/// `endpoints` should be this run's validated set and must not be stale:
/// every playlist line points at one of them, and the file is overwritten,
/// never merged.
#[instrument(skip_all, fields(endpoints = endpoints.len(), template = %template_path.display()))]
pub fn assemble_playlist(
    endpoints: &[Endpoint],
    template_path: &Path,
    playlist_path: &Path,
) -> Result<AssemblyOutcome> {
    if endpoints.is_empty() {
        return Ok(AssemblyOutcome::Empty);
    }

    let Some(template) = ChannelTemplate::load(template_path)? else {
        warn!(
            path = %template_path.display(),
            "channel template not found, playlist not generated"
        );
        return Ok(AssemblyOutcome::TemplateMissing {
            path: template_path.to_path_buf(),
        });
    };

    let playlist = build_playlist(endpoints, &template);
    if playlist.is_empty() {
        warn!(
            template_entries = template.len(),
            "template produced no stream entries, playlist not written"
        );
        return Ok(AssemblyOutcome::Empty);
    }

    write_playlist(playlist_path, &playlist)?;

    info!(
        entries = playlist.len(),
        template_entries = template.len(),
        path = %playlist_path.display(),
        "playlist assembled"
    );

    Ok(AssemblyOutcome::Written {
        path: playlist_path.to_path_buf(),
        entries: playlist.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

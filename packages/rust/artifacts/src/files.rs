//! Output file writers.
//!
//! Every write replaces the file wholesale: lines joined with `\n`, no
//! trailing newline, no header. Nothing is ever appended or merged, so a file
//! only ever reflects a single run.

use std::path::Path;

use relayscout_shared::{Endpoint, PlaylistEntry, RelayScoutError, Result};
use tracing::info;

/// Overwrite `path` with the endpoints, sorted.
pub fn write_endpoints(path: &Path, endpoints: &[Endpoint]) -> Result<()> {
    let mut sorted: Vec<&str> = endpoints.iter().map(Endpoint::as_str).collect();
    sorted.sort_unstable();
    write_lines(path, &sorted)?;
    info!(path = %path.display(), count = sorted.len(), "endpoints written");
    Ok(())
}

/// Overwrite `path` with the playlist, in the order given.
pub fn write_playlist(path: &Path, playlist: &[PlaylistEntry]) -> Result<()> {
    let lines: Vec<String> = playlist.iter().map(ToString::to_string).collect();
    write_lines(path, &lines)?;
    info!(path = %path.display(), count = lines.len(), "playlist written");
    Ok(())
}

/// Read a previously written endpoints file. Blank lines are ignored;
/// a malformed line is an error naming the line.
pub fn read_endpoints(path: &Path) -> Result<Vec<Endpoint>> {
    let content = std::fs::read_to_string(path).map_err(|e| RelayScoutError::io(path, e))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.parse::<Endpoint>().map_err(|e| {
                RelayScoutError::parse(format!("{}:{}: {e}", path.display(), i + 1))
            })
        })
        .collect()
}

fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| RelayScoutError::io(parent, e))?;
    }

    let content = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join("\n");

    std::fs::write(path, content).map_err(|e| RelayScoutError::io(path, e))
}

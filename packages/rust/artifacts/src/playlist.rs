//! Playlist assembly: every validated relay crossed with every template entry.

use std::collections::HashSet;

use relayscout_shared::{ChannelEntry, Endpoint, PlaylistEntry, StreamProtocol};
use tracing::debug;

use crate::template::ChannelTemplate;

/// Point one template entry at one relay.
///
/// `rtp://239.1.1.1:1234` on `1.2.3.4:8888` becomes
/// `http://1.2.3.4:8888/rtp/239.1.1.1:1234`. Entries whose stream URL has no
/// `://` are not streams (genre headers and the like) and yield `None`.
pub fn rewrite_entry(endpoint: &Endpoint, entry: &ChannelEntry) -> Option<PlaylistEntry> {
    let (scheme, locator) = entry.stream_url.split_once("://")?;
    let proto = StreamProtocol::from_scheme(scheme.trim());

    Some(PlaylistEntry {
        name: entry.name.clone(),
        url: format!("http://{endpoint}/{}/{locator}", proto.as_str()),
    })
}

/// Build the playlist for a validated set.
///
/// Duplicates are dropped, keeping the first occurrence, so the result is
/// relay order × template order. Its length is at most
/// `endpoints.len() * template.len()`.
pub fn build_playlist(endpoints: &[Endpoint], template: &ChannelTemplate) -> Vec<PlaylistEntry> {
    let mut seen = HashSet::new();
    let mut playlist = Vec::new();
    let mut skipped = 0usize;

    for endpoint in endpoints {
        for entry in &template.entries {
            match rewrite_entry(endpoint, entry) {
                Some(line) => {
                    if seen.insert(line.clone()) {
                        playlist.push(line);
                    }
                }
                None => skipped += 1,
            }
        }
    }

    debug!(
        entries = playlist.len(),
        skipped_non_stream = skipped,
        "playlist built"
    );

    playlist
}

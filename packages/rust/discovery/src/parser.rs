//! Candidate extraction from search result pages.
//!
//! The search service returns arbitrary HTML. Rather than walk its markup we
//! scan the raw text for `IPv4:port` tokens, which survives layout changes.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use relayscout_shared::Endpoint;
use tracing::debug;

/// Matches `a.b.c.d:port` anywhere in the page.
static ENDPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d+").expect("endpoint regex")
});

/// Extract every distinct `IPv4:port` token from `body`, sorted.
pub(crate) fn extract_endpoints(body: &str) -> Vec<Endpoint> {
    let mut found = BTreeSet::new();

    for m in ENDPOINT_RE.find_iter(body) {
        match m.as_str().parse::<Endpoint>() {
            Ok(endpoint) => {
                found.insert(endpoint);
            }
            Err(e) => debug!(token = m.as_str(), error = %e, "skipping token"),
        }
    }

    found.into_iter().collect()
}

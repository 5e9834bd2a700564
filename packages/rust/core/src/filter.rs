//! Filter stage: geo-validate candidates one at a time.
//!
//! Lookups are strictly sequential with a fixed pause between them. The
//! geolocation service throttles (and eventually blocks) clients that query
//! in parallel, and a throttled lookup reads as a false negative, so running
//! this stage concurrently would change its results.

use std::time::Duration;

use relayscout_probe::GeoValidator;
use relayscout_shared::Endpoint;
use tracing::{info, instrument};

use crate::pipeline::{ProgressReporter, Stage};

/// Keep the candidates whose host passes the geo predicate.
///
/// Input order is preserved. `delay` is slept between consecutive lookups
/// whatever their outcome.
#[instrument(skip_all, fields(candidates = candidates.len(), delay_ms = delay.as_millis() as u64))]
pub async fn filter_by_geo(
    candidates: &[Endpoint],
    validator: &GeoValidator,
    delay: Duration,
    progress: &dyn ProgressReporter,
) -> Vec<Endpoint> {
    let total = candidates.len();
    let mut approved = Vec::new();

    for (i, candidate) in candidates.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let verdict = validator.check(candidate.host()).await;
        let passed = verdict.is_match();
        if passed {
            info!(endpoint = %candidate, %verdict, "geo match");
            approved.push(candidate.clone());
        } else {
            info!(endpoint = %candidate, %verdict, "geo rejected");
        }

        progress.endpoint_checked(Stage::Filter, candidate, passed, i + 1, total);
    }

    info!(approved = approved.len(), total, "geo filter finished");
    approved
}

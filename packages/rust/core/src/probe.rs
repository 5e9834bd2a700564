//! Probe stage: liveness-check geo-approved relays on a bounded worker pool.
//!
//! Every probe is independent. Results are collected in completion order,
//! then sorted, and the endpoints file is written once, after all probes have
//! finished.

use std::path::Path;
use std::sync::Arc;

use relayscout_artifacts::write_endpoints;
use relayscout_probe::{LivenessOptions, LivenessProber, LivenessVerdict};
use relayscout_shared::{Endpoint, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::pipeline::{ProgressReporter, Stage};

/// What the probe stage left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStageOutcome {
    /// Enough live relays; the endpoints file now holds exactly these.
    Persisted { live: Vec<Endpoint> },
    /// Too few live relays. The endpoints file was not touched.
    Insufficient { live: Vec<Endpoint> },
}

impl ProbeStageOutcome {
    pub fn live(&self) -> &[Endpoint] {
        match self {
            Self::Persisted { live } | Self::Insufficient { live } => live,
        }
    }
}

/// Probe every endpoint with at most `workers` probes in flight.
///
/// Returns the live endpoints, sorted.
#[instrument(skip_all, fields(endpoints = endpoints.len(), workers = workers))]
pub async fn probe_all(
    endpoints: &[Endpoint],
    opts: &LivenessOptions,
    workers: usize,
    progress: &dyn ProgressReporter,
) -> Result<Vec<Endpoint>> {
    if endpoints.is_empty() {
        return Ok(Vec::new());
    }

    let prober = LivenessProber::new(opts)?;
    let semaphore = Arc::new(Semaphore::new(workers.clamp(1, Semaphore::MAX_PERMITS)));
    let mut tasks = JoinSet::new();

    for endpoint in endpoints.iter().cloned() {
        let prober = prober.clone();
        let sem = semaphore.clone();
        tasks.spawn(async move {
            // The semaphore is never closed, so this always holds a permit.
            let _permit = sem.acquire_owned().await.ok();
            let verdict = prober.probe(&endpoint).await;
            (endpoint, verdict)
        });
    }

    let total = endpoints.len();
    let mut done = 0usize;
    let mut live = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        done += 1;
        match joined {
            Ok((endpoint, verdict)) => {
                let alive = verdict.is_alive();
                match &verdict {
                    LivenessVerdict::Alive { .. } => info!(%endpoint, %verdict, "relay online"),
                    LivenessVerdict::Dead { .. } => info!(%endpoint, %verdict, "relay offline"),
                }
                progress.endpoint_checked(Stage::Probe, &endpoint, alive, done, total);
                if alive {
                    live.push(endpoint);
                }
            }
            Err(e) => warn!(error = %e, "probe task failed"),
        }
    }

    live.sort();
    info!(live = live.len(), total, "probing finished");
    Ok(live)
}

/// Probe the geo-approved relays and persist the live ones.
///
/// The endpoints file is overwritten only when at least `min_live` relays
/// are live; otherwise it keeps the previous run's content.
pub async fn run_probe_stage(
    approved: &[Endpoint],
    opts: &LivenessOptions,
    workers: usize,
    min_live: usize,
    endpoints_file: &Path,
    progress: &dyn ProgressReporter,
) -> Result<ProbeStageOutcome> {
    let live = probe_all(approved, opts, workers, progress).await?;

    if live.is_empty() || live.len() < min_live {
        warn!(
            live = live.len(),
            min_live,
            path = %endpoints_file.display(),
            "not enough live relays, keeping previous endpoints file"
        );
        return Ok(ProbeStageOutcome::Insufficient { live });
    }

    write_endpoints(endpoints_file, &live)?;
    Ok(ProbeStageOutcome::Persisted { live })
}

//! Relay liveness probing.
//!
//! A relay is alive when one of its status pages answers with exactly 200
//! and a body that reads like a relay status page. Paths are tried in order
//! and the first success short-circuits; a failing path is never retried.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use relayscout_shared::{Endpoint, ProbeConfig, RelayScoutError, Result};
use tracing::{debug, instrument};

use crate::verdict::{LivenessVerdict, ProbeAttempt, ProbeFailure};

/// Redirect hops allowed when `follow_redirects` is on.
const MAX_REDIRECTS: usize = 3;

/// Resolved probe settings.
#[derive(Debug, Clone)]
pub struct LivenessOptions {
    /// Status paths, each starting with `/`.
    pub status_paths: Vec<String>,
    pub user_agent: String,
    /// Any of these (case-insensitive) in a 200 body means alive.
    pub body_keywords: Vec<String>,
    pub timeout: Duration,
    pub follow_redirects: bool,
}

impl From<&ProbeConfig> for LivenessOptions {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            status_paths: config.status_paths.clone(),
            user_agent: config.user_agent.clone(),
            body_keywords: config.body_keywords.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            follow_redirects: config.follow_redirects,
        }
    }
}

/// Probes relay status pages. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct LivenessProber {
    client: Client,
    paths: Vec<String>,
    /// Keywords folded once up front.
    keywords: Vec<String>,
}

impl LivenessProber {
    pub fn new(opts: &LivenessOptions) -> Result<Self> {
        let redirect = if opts.follow_redirects {
            reqwest::redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(opts.user_agent.as_str())
            .redirect(redirect)
            .timeout(opts.timeout)
            .build()
            .map_err(|e| RelayScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            paths: opts.status_paths.clone(),
            keywords: opts.body_keywords.iter().map(|k| k.to_lowercase()).collect(),
        })
    }

    /// Try each status path in order until one proves the relay alive.
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn probe(&self, endpoint: &Endpoint) -> LivenessVerdict {
        let mut attempts = Vec::with_capacity(self.paths.len());

        for path in &self.paths {
            let url = format!("http://{endpoint}{path}");
            match self.probe_path(&url).await {
                Ok(()) => {
                    debug!(%path, "status page answered");
                    return LivenessVerdict::Alive { path: path.clone() };
                }
                Err(failure) => {
                    debug!(%path, %failure, "status path failed");
                    attempts.push(ProbeAttempt {
                        path: path.clone(),
                        failure,
                    });
                }
            }
        }

        LivenessVerdict::Dead { attempts }
    }

    async fn probe_path(&self, url: &str) -> std::result::Result<(), ProbeFailure> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProbeFailure::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProbeFailure::Timeout
            } else {
                ProbeFailure::Body(e.to_string())
            }
        })?;

        if self.is_status_page(&body) {
            Ok(())
        } else {
            Err(ProbeFailure::MissingKeyword)
        }
    }

    fn is_status_page(&self, body: &str) -> bool {
        let folded = body.to_lowercase();
        self.keywords.iter().any(|k| folded.contains(k.as_str()))
    }
}

/// Map a transport error onto a probe failure.
fn classify(e: reqwest::Error) -> ProbeFailure {
    if e.is_timeout() {
        ProbeFailure::Timeout
    } else if e.is_connect() {
        ProbeFailure::Connect(e.to_string())
    } else {
        ProbeFailure::Other(e.to_string())
    }
}

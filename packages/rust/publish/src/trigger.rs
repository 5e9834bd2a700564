//! Downstream workflow trigger.
//!
//! After artifacts are published, a `workflow_dispatch` event is sent to a
//! consumer repository so it rebuilds from the fresh files. The target
//! branch is not always known; a 422 on the primary branch is retried once
//! with the fallback branch, and that is the only retry.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use relayscout_shared::{RelayScoutError, Result, TriggerConfig, env_credential};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// User-Agent string for dispatch requests.
const USER_AGENT: &str = concat!("relayscout/", env!("CARGO_PKG_VERSION"));

/// Timeout for a single dispatch request.
const DISPATCH_TIMEOUT_SECS: u64 = 15;

/// Resolved trigger settings.
#[derive(Debug, Clone)]
pub struct TriggerOptions {
    pub api_base_url: String,
    /// `owner/name`.
    pub repository: String,
    /// Workflow file name.
    pub workflow: String,
    pub branch: String,
    pub fallback_branch: Option<String>,
    /// Access token; `None` skips the trigger.
    pub token: Option<String>,
}

impl TriggerOptions {
    /// Build options from the `[trigger]` section, reading the token from
    /// the configured environment variable.
    pub fn from_config(config: &TriggerConfig) -> Self {
        Self {
            api_base_url: config.api_base_url.clone(),
            repository: config.repository.clone(),
            workflow: config.workflow.clone(),
            branch: config.branch.clone(),
            fallback_branch: config.fallback_branch.clone(),
            token: env_credential(&config.token_env),
        }
    }

    fn dispatch_url(&self) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/dispatches",
            self.api_base_url.trim_end_matches('/'),
            self.repository,
            self.workflow
        )
    }
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// No token configured.
    Skipped,
    /// Accepted (204) for this branch.
    Dispatched { branch: String },
    /// Rejected or unreachable. `status` is `None` for transport errors.
    Failed {
        branch: String,
        status: Option<u16>,
        message: String,
    },
}

impl TriggerOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

impl std::fmt::Display for TriggerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped => f.write_str("skipped (no token)"),
            Self::Dispatched { branch } => write!(f, "dispatched on {branch}"),
            Self::Failed {
                branch,
                status: Some(status),
                message,
            } => write!(f, "failed on {branch}: HTTP {status} {message}"),
            Self::Failed {
                branch,
                status: None,
                message,
            } => write!(f, "failed on {branch}: {message}"),
        }
    }
}

#[derive(Serialize)]
struct DispatchBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

/// Fire the downstream workflow.
///
/// Remote failures come back as [`TriggerOutcome::Failed`]; `Err` is only
/// returned when the HTTP client cannot be built.
#[instrument(skip_all, fields(repository = %opts.repository, workflow = %opts.workflow))]
pub async fn trigger_workflow(opts: &TriggerOptions) -> Result<TriggerOutcome> {
    let Some(token) = opts.token.as_deref() else {
        warn!("no access token set, skipping workflow trigger");
        return Ok(TriggerOutcome::Skipped);
    };

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(DISPATCH_TIMEOUT_SECS))
        .build()
        .map_err(|e| RelayScoutError::Network(format!("failed to build HTTP client: {e}")))?;

    let url = opts.dispatch_url();

    let first = dispatch(&client, &url, token, &opts.branch).await;
    let retry_branch = match (&first, opts.fallback_branch.as_deref()) {
        (
            TriggerOutcome::Failed {
                status: Some(422), ..
            },
            Some(fallback),
        ) if fallback != opts.branch => Some(fallback),
        _ => None,
    };

    let outcome = match retry_branch {
        Some(fallback) => {
            warn!(
                branch = %opts.branch,
                %fallback,
                "branch rejected (422), retrying with fallback"
            );
            dispatch(&client, &url, token, fallback).await
        }
        None => first,
    };

    match &outcome {
        TriggerOutcome::Dispatched { branch } => info!(%branch, "workflow dispatched"),
        TriggerOutcome::Failed {
            branch,
            status,
            message,
        } => warn!(%branch, ?status, %message, "workflow dispatch failed"),
        TriggerOutcome::Skipped => {}
    }

    Ok(outcome)
}

async fn dispatch(client: &Client, url: &str, token: &str, branch: &str) -> TriggerOutcome {
    let response = client
        .post(url)
        .header(reqwest::header::AUTHORIZATION, format!("token {token}"))
        .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
        .json(&DispatchBody { git_ref: branch })
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            return TriggerOutcome::Failed {
                branch: branch.to_string(),
                status: None,
                message: e.to_string(),
            };
        }
    };

    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return TriggerOutcome::Dispatched {
            branch: branch.to_string(),
        };
    }

    let message = response.text().await.unwrap_or_default();
    TriggerOutcome::Failed {
        branch: branch.to_string(),
        status: Some(status.as_u16()),
        message,
    }
}

//! Candidate discovery via an external search service.
//!
//! One GET against the search results page, then a regex scan of whatever
//! comes back. Any failure of the service (non-200, transport error,
//! unreadable body) means "no candidates", never an error: an empty result is
//! a valid terminal outcome the pipeline reports on its own.

mod parser;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use relayscout_shared::{Endpoint, RelayScoutError, Result, SearchConfig, env_credential};
use tracing::{debug, info, instrument, warn};

/// Maximum number of redirects to follow on the search request.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Resolved settings for one discovery request.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Search results page.
    pub base_url: String,
    /// Plain-text query, sent base64-encoded as `qbase64`.
    pub query: String,
    /// Browser-like User-Agent.
    pub user_agent: String,
    /// Session cookie, if one is configured.
    pub cookie: Option<String>,
    pub timeout: Duration,
}

impl DiscoveryOptions {
    /// Build options from the `[search]` section, reading the cookie from
    /// the configured environment variable.
    pub fn from_config(config: &SearchConfig) -> Self {
        let cookie = env_credential(&config.cookie_env);
        if cookie.is_none() {
            warn!(
                env = %config.cookie_env,
                "search cookie not set, results may be truncated"
            );
        }

        Self {
            base_url: config.base_url.clone(),
            query: config.query.clone(),
            user_agent: config.user_agent.clone(),
            cookie,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// The `qbase64` query parameter value.
    pub fn encoded_query(&self) -> String {
        BASE64.encode(self.query.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Query the search service and return the distinct candidates, sorted.
///
/// Only local setup problems (an invalid cookie header, a client that cannot
/// be built) are returned as `Err`.
#[instrument(skip_all, fields(url = %opts.base_url))]
pub async fn discover(opts: &DiscoveryOptions) -> Result<Vec<Endpoint>> {
    let client = build_client(opts)?;

    info!(query = %opts.query, "querying search service");

    let body = match fetch_results(&client, opts).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "search request failed, treating as no candidates");
            return Ok(Vec::new());
        }
    };

    let candidates = parser::extract_endpoints(&body);

    info!(
        candidates = candidates.len(),
        body_len = body.len(),
        "search results scanned"
    );

    Ok(candidates)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client carrying the search headers.
fn build_client(opts: &DiscoveryOptions) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = &opts.cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| RelayScoutError::config(format!("search cookie is not a valid header: {e}")))?;
        headers.insert(COOKIE, value);
    }

    Client::builder()
        .user_agent(opts.user_agent.as_str())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(opts.timeout)
        .build()
        .map_err(|e| RelayScoutError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetch the results page. Every failure here is transient from the
/// pipeline's point of view.
async fn fetch_results(client: &Client, opts: &DiscoveryOptions) -> Result<String> {
    let response = client
        .get(&opts.base_url)
        .query(&[("qbase64", opts.encoded_query())])
        .send()
        .await
        .map_err(|e| RelayScoutError::Network(format!("{}: {e}", opts.base_url)))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(RelayScoutError::Network(format!(
            "{}: HTTP {status}",
            opts.base_url
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| RelayScoutError::Network(format!("{}: failed to read body: {e}", opts.base_url)))?;

    debug!(body_len = body.len(), "search page received");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(server: &MockServer) -> DiscoveryOptions {
        DiscoveryOptions {
            base_url: format!("{}/result", server.uri()),
            query: r#""UDPXY" && region="Guangdong""#.into(),
            user_agent: "Mozilla/5.0 (test)".into(),
            cookie: Some("fofa_token=abc".into()),
            timeout: Duration::from_secs(5),
        }
    }

    fn as_strs(endpoints: &[Endpoint]) -> Vec<&str> {
        endpoints.iter().map(Endpoint::as_str).collect()
    }

    #[test]
    fn query_is_base64_encoded() {
        let opts = DiscoveryOptions {
            base_url: "https://fofa.info/result".into(),
            query: r#""UDPXY" && country="CN" && region="Guangdong" && city="Zhongshan""#.into(),
            user_agent: String::new(),
            cookie: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(
            opts.encoded_query(),
            "IlVEUFhZIiAmJiBjb3VudHJ5PSJDTiIgJiYgcmVnaW9uPSJHdWFuZ2RvbmciICYmIGNpdHk9Ilpob25nc2hhbiI="
        );
    }

    #[tokio::test]
    async fn discover_sends_headers_and_extracts() {
        let server = MockServer::start().await;
        let opts = options(&server);

        Mock::given(method("GET"))
            .and(path("/result"))
            .and(query_param("qbase64", opts.encoded_query().as_str()))
            .and(header("cookie", "fofa_token=abc"))
            .and(header("user-agent", "Mozilla/5.0 (test)"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<a>59.41.7.1:8000</a> <a>14.145.3.3:4022</a> <a>59.41.7.1:8000</a>",
            ))
            .mount(&server)
            .await;

        let found = discover(&opts).await.unwrap();
        assert_eq!(as_strs(&found), ["14.145.3.3:4022", "59.41.7.1:8000"]);
    }

    #[tokio::test]
    async fn discover_on_server_error_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("1.2.3.4:8888"))
            .mount(&server)
            .await;

        let found = discover(&options(&server)).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn discover_on_not_found_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let found = discover(&options(&server)).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn discover_on_unreachable_service_is_empty() {
        let opts = DiscoveryOptions {
            // Port 9 (discard) on loopback: connection refused.
            base_url: "http://127.0.0.1:9/result".into(),
            query: "udpxy".into(),
            user_agent: "test".into(),
            cookie: None,
            timeout: Duration::from_secs(2),
        };
        let found = discover(&opts).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn invalid_cookie_is_a_config_error() {
        let opts = DiscoveryOptions {
            base_url: "http://127.0.0.1:9/result".into(),
            query: "udpxy".into(),
            user_agent: "test".into(),
            cookie: Some("bad\ncookie".into()),
            timeout: Duration::from_secs(1),
        };
        let err = discover(&opts).await.unwrap_err();
        assert!(matches!(err, RelayScoutError::Config { .. }));
    }
}

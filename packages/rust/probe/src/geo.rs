//! Region + ISP filtering through an ip-api compatible geolocation service.

use std::time::Duration;

use reqwest::Client;
use relayscout_shared::{GeoConfig, RelayScoutError, Result};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::verdict::GeoVerdict;

/// User-Agent string for geolocation lookups.
const USER_AGENT: &str = concat!("relayscout/", env!("CARGO_PKG_VERSION"));

/// Resolved geo predicate and service settings.
#[derive(Debug, Clone)]
pub struct GeoOptions {
    /// Service base URL; lookups go to `{base_url}/json/{host}`.
    pub base_url: String,
    pub lang: String,
    /// Target region, matched as a substring of `regionName`.
    pub region: String,
    /// ISP aliases, matched case-insensitively against `isp` + `org`.
    pub isp_keywords: Vec<String>,
    pub timeout: Duration,
}

impl From<&GeoConfig> for GeoOptions {
    fn from(config: &GeoConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            lang: config.lang.clone(),
            region: config.region.clone(),
            isp_keywords: config.isp_keywords.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Geolocation service response. Fields absent on failure are `None`.
#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "regionName")]
    region_name: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    org: Option<String>,
}

/// Checks hosts against a target region and network operator.
pub struct GeoValidator {
    client: Client,
    opts: GeoOptions,
    /// Keywords folded once up front.
    keywords: Vec<String>,
}

impl GeoValidator {
    pub fn new(opts: GeoOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(opts.timeout)
            .build()
            .map_err(|e| RelayScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        let keywords = opts.isp_keywords.iter().map(|k| k.to_lowercase()).collect();

        Ok(Self {
            client,
            opts,
            keywords,
        })
    }

    /// Look up a bare host (no port) and apply the region + ISP predicate.
    #[instrument(skip(self))]
    pub async fn check(&self, host: &str) -> GeoVerdict {
        let response = match self.lookup(host).await {
            Ok(r) => r,
            Err(reason) => {
                debug!(%reason, "geo lookup failed");
                return GeoVerdict::Unavailable { reason };
            }
        };

        let status = response.status.unwrap_or_default();
        if status != "success" {
            return GeoVerdict::Rejected { status };
        }

        let region = response.region_name.unwrap_or_default();
        let isp = format!(
            "{}{}",
            response.isp.unwrap_or_default(),
            response.org.unwrap_or_default()
        )
        .to_lowercase();

        if self.matches(&region, &isp) {
            GeoVerdict::Match { region, isp }
        } else {
            GeoVerdict::Mismatch { region, isp }
        }
    }

    /// Region must contain the target; the folded ISP/org string must
    /// contain at least one keyword.
    fn matches(&self, region: &str, isp_folded: &str) -> bool {
        region.contains(self.opts.region.as_str())
            && self.keywords.iter().any(|k| isp_folded.contains(k.as_str()))
    }

    async fn lookup(&self, host: &str) -> std::result::Result<GeoResponse, String> {
        let url = format!("{}/json/{host}", self.opts.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("lang", self.opts.lang.as_str())])
            .send()
            .await
            .map_err(|e| format!("{url}: {e}"))?;

        response
            .json::<GeoResponse>()
            .await
            .map_err(|e| format!("{url}: invalid JSON: {e}"))
    }
}

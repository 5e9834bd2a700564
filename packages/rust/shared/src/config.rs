//! Application configuration for relayscout.
//!
//! User config lives at `~/.relayscout/relayscout.toml` unless a path is
//! given explicitly. CLI flags override config file values, which override
//! defaults. Credentials are never stored here, only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RelayScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "relayscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".relayscout";

/// Upper bound on concurrent liveness probes.
pub const MAX_PROBE_WORKERS: usize = 256;

// ---------------------------------------------------------------------------
// Config structs (matching relayscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Candidate search service.
    #[serde(default)]
    pub search: SearchConfig,

    /// Geolocation service and region/ISP predicate.
    #[serde(default)]
    pub geo: GeoConfig,

    /// Relay liveness probing.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Input template and generated files.
    #[serde(default)]
    pub output: OutputConfig,

    /// Commit-and-push of generated files.
    #[serde(default)]
    pub publish: PublishConfig,

    /// Downstream workflow dispatch.
    #[serde(default)]
    pub trigger: TriggerConfig,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search results page; the query is appended as `qbase64`.
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// Plain-text search query (base64-encoded on the wire).
    #[serde(default = "default_search_query")]
    pub query: String,

    /// Browser-like User-Agent for the search request.
    #[serde(default = "default_browser_user_agent")]
    pub user_agent: String,

    /// Name of the env var holding the session cookie.
    #[serde(default = "default_cookie_env")]
    pub cookie_env: String,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            query: default_search_query(),
            user_agent: default_browser_user_agent(),
            cookie_env: default_cookie_env(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_url() -> String {
    "https://fofa.info/result".into()
}
fn default_search_query() -> String {
    r#""UDPXY" && country="CN" && region="Guangdong" && city="Zhongshan""#.into()
}
fn default_browser_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .into()
}
fn default_cookie_env() -> String {
    "FOFA_COOKIE".into()
}
fn default_search_timeout() -> u64 {
    15
}

/// `[geo]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Base URL of the geolocation service (`/json/{host}` is appended).
    #[serde(default = "default_geo_url")]
    pub base_url: String,

    /// Language requested for region names.
    #[serde(default = "default_geo_lang")]
    pub lang: String,

    /// Region name the host must be located in (substring match).
    #[serde(default = "default_region")]
    pub region: String,

    /// ISP aliases; at least one must appear in `isp` + `org`.
    #[serde(default = "default_isp_keywords")]
    pub isp_keywords: Vec<String>,

    #[serde(default = "default_geo_timeout")]
    pub timeout_secs: u64,

    /// Pause between consecutive lookups, to stay under the service's rate limit.
    #[serde(default = "default_geo_delay")]
    pub delay_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            base_url: default_geo_url(),
            lang: default_geo_lang(),
            region: default_region(),
            isp_keywords: default_isp_keywords(),
            timeout_secs: default_geo_timeout(),
            delay_ms: default_geo_delay(),
        }
    }
}

fn default_geo_url() -> String {
    "http://ip-api.com".into()
}
fn default_geo_lang() -> String {
    "zh-CN".into()
}
fn default_region() -> String {
    "广东".into()
}
fn default_isp_keywords() -> Vec<String> {
    ["电信", "telecom", "chinanet", "chinatelecom"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_geo_timeout() -> u64 {
    10
}
fn default_geo_delay() -> u64 {
    1500
}

/// `[probe]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Status pages tried in order; the first live one wins.
    #[serde(default = "default_status_paths")]
    pub status_paths: Vec<String>,

    /// Minimal User-Agent; some relays reject browser agents.
    #[serde(default = "default_probe_user_agent")]
    pub user_agent: String,

    /// Body keywords (case-insensitive) that mark a status page as live.
    #[serde(default = "default_body_keywords")]
    pub body_keywords: Vec<String>,

    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Concurrent probes.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Follow redirects from status pages. Off by default so captive or
    /// error pages behind a redirect do not count as live.
    #[serde(default)]
    pub follow_redirects: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            status_paths: default_status_paths(),
            user_agent: default_probe_user_agent(),
            body_keywords: default_body_keywords(),
            timeout_secs: default_probe_timeout(),
            workers: default_workers(),
            follow_redirects: false,
        }
    }
}

fn default_status_paths() -> Vec<String> {
    ["/stat", "/status", "/status/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_probe_user_agent() -> String {
    "Wget/1.14".into()
}
fn default_body_keywords() -> Vec<String> {
    ["udpxy", "stat", "client"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_probe_timeout() -> u64 {
    4
}
fn default_workers() -> usize {
    15
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Sorted list of validated relays, one `host:port` per line.
    #[serde(default = "default_endpoints_file")]
    pub endpoints_file: PathBuf,

    /// Generated playlist, one `name,url` per line.
    #[serde(default = "default_playlist_file")]
    pub playlist_file: PathBuf,

    /// Channel template (`name,rtp://...` per line), maintained by hand.
    #[serde(default = "default_template_file")]
    pub template_file: PathBuf,

    /// Fewer live relays than this stops the run before anything is written.
    #[serde(default = "default_min_live")]
    pub min_live_endpoints: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            endpoints_file: default_endpoints_file(),
            playlist_file: default_playlist_file(),
            template_file: default_template_file(),
            min_live_endpoints: default_min_live(),
        }
    }
}

fn default_endpoints_file() -> PathBuf {
    "source-ip.txt".into()
}
fn default_playlist_file() -> PathBuf {
    "source-m3u.txt".into()
}
fn default_template_file() -> PathBuf {
    PathBuf::from("rtp").join("广东电信.txt")
}
fn default_min_live() -> usize {
    1
}

/// `[publish]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Repository working tree to commit in.
    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_dir: default_repo_dir(),
            remote: default_remote(),
            branch: default_branch(),
            commit_message: default_commit_message(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_repo_dir() -> PathBuf {
    ".".into()
}
fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "main".into()
}
fn default_commit_message() -> String {
    "Update source IPs and M3U files".into()
}
fn default_author_name() -> String {
    "github-actions[bot]".into()
}
fn default_author_email() -> String {
    "github-actions[bot]@users.noreply.github.com".into()
}

/// `[trigger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_url")]
    pub api_base_url: String,

    /// `owner/name` of the repository whose workflow is dispatched.
    #[serde(default = "default_target_repo")]
    pub repository: String,

    /// Workflow file name, e.g. `main.yml`.
    #[serde(default = "default_workflow")]
    pub workflow: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Tried once if the primary branch is rejected with 422.
    #[serde(default = "default_fallback_branch")]
    pub fallback_branch: Option<String>,

    /// Name of the env var holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: default_api_url(),
            repository: default_target_repo(),
            workflow: default_workflow(),
            branch: default_branch(),
            fallback_branch: default_fallback_branch(),
            token_env: default_token_env(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}
fn default_target_repo() -> String {
    "JE668/iptv-api".into()
}
fn default_workflow() -> String {
    "main.yml".into()
}
fn default_fallback_branch() -> Option<String> {
    Some("master".into())
}
fn default_token_env() -> String {
    "PAT_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.relayscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RelayScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.relayscout/relayscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RelayScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        RelayScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RelayScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RelayScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RelayScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations no run could succeed with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    for (name, raw) in [
        ("search.base_url", &config.search.base_url),
        ("geo.base_url", &config.geo.base_url),
        ("trigger.api_base_url", &config.trigger.api_base_url),
    ] {
        url::Url::parse(raw)
            .map_err(|e| RelayScoutError::config(format!("{name} '{raw}' is not a URL: {e}")))?;
    }

    if config.probe.status_paths.is_empty() {
        return Err(RelayScoutError::config("probe.status_paths must not be empty"));
    }
    if let Some(bad) = config.probe.status_paths.iter().find(|p| !p.starts_with('/')) {
        return Err(RelayScoutError::config(format!(
            "probe.status_paths entry '{bad}' must start with '/'"
        )));
    }
    if config.probe.workers == 0 || config.probe.workers > MAX_PROBE_WORKERS {
        return Err(RelayScoutError::config(format!(
            "probe.workers must be between 1 and {MAX_PROBE_WORKERS}"
        )));
    }
    if config.probe.body_keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(RelayScoutError::config("probe.body_keywords must not be empty"));
    }
    for (name, secs) in [
        ("search.timeout_secs", config.search.timeout_secs),
        ("geo.timeout_secs", config.geo.timeout_secs),
        ("probe.timeout_secs", config.probe.timeout_secs),
    ] {
        if secs == 0 {
            return Err(RelayScoutError::config(format!("{name} must be at least 1")));
        }
    }
    if config.geo.delay_ms == 0 {
        return Err(RelayScoutError::config("geo.delay_ms must be at least 1"));
    }
    if config.geo.isp_keywords.is_empty() {
        return Err(RelayScoutError::config("geo.isp_keywords must not be empty"));
    }
    if config.output.min_live_endpoints == 0 {
        return Err(RelayScoutError::config(
            "output.min_live_endpoints must be at least 1",
        ));
    }
    Ok(())
}

/// Read a credential from the named environment variable.
/// Unset and empty both mean "no credential".
pub fn env_credential(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("FOFA_COOKIE"));
        assert!(toml_str.contains("PAT_TOKEN"));
        assert!(toml_str.contains("/status/"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.probe.workers, 15);
        assert_eq!(parsed.geo.delay_ms, 1500);
        assert_eq!(parsed.trigger.fallback_branch.as_deref(), Some("master"));
        validate_config(&parsed).expect("defaults are valid");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[geo]
region = "浙江"
isp_keywords = ["移动", "mobile", "cmnet"]

[probe]
workers = 10
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.geo.region, "浙江");
        assert_eq!(config.geo.isp_keywords.len(), 3);
        assert_eq!(config.geo.timeout_secs, 10);
        assert_eq!(config.probe.workers, 10);
        assert_eq!(config.probe.status_paths, ["/stat", "/status", "/status/"]);
        assert_eq!(config.output.endpoints_file, PathBuf::from("source-ip.txt"));
    }

    #[test]
    fn validation_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.probe.workers = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("probe.workers"));
    }

    #[test]
    fn validation_rejects_oversized_pool() {
        let mut config = AppConfig::default();
        config.probe.workers = MAX_PROBE_WORKERS;
        validate_config(&config).expect("upper bound is inclusive");

        config.probe.workers = MAX_PROBE_WORKERS + 1;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("probe.workers"));
    }

    #[test]
    fn validation_rejects_disabled_rate_limit_and_timeouts() {
        let mut config = AppConfig::default();
        config.geo.delay_ms = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("geo.delay_ms"));

        let mut config = AppConfig::default();
        config.probe.timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("probe.timeout_secs"));

        let mut config = AppConfig::default();
        config.search.timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.geo.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validation_rejects_empty_body_keywords() {
        let mut config = AppConfig::default();
        config.probe.body_keywords = vec![];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("probe.body_keywords"));

        config.probe.body_keywords = vec!["  ".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validation_rejects_relative_status_path() {
        let mut config = AppConfig::default();
        config.probe.status_paths = vec!["stat".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validation_rejects_bad_service_url() {
        let mut config = AppConfig::default();
        config.geo.base_url = "ip-api.com".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("geo.base_url"));
    }

    #[test]
    fn missing_credential_is_none() {
        // Use a unique env var name to avoid interfering with other tests
        assert_eq!(env_credential("RS_TEST_NONEXISTENT_CREDENTIAL_12345"), None);
    }
}

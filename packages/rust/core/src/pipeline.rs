//! End-to-end run: discovery → geo filter → probe → assemble → publish → trigger.
//!
//! Each stage short-circuits the run when it produces nothing. An early stop
//! is a normal outcome, not an error, and it guarantees that no output file
//! is overwritten with empty or partial data.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use relayscout_discovery::DiscoveryOptions;
use relayscout_probe::{GeoOptions, GeoValidator, LivenessOptions};
use relayscout_publish::{ArtifactSink, PublishOutcome, TriggerOptions, TriggerOutcome};
use relayscout_shared::{AppConfig, Endpoint, Result, RunId};

use crate::assembler::{AssemblyOutcome, assemble_playlist};
use crate::filter::filter_by_geo;
use crate::probe::{ProbeStageOutcome, run_probe_stage};

// ---------------------------------------------------------------------------
// Stages and progress
// ---------------------------------------------------------------------------

/// Stages that check endpoints and can end a run early, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Filter,
    Probe,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovery => "discovery",
            Self::Filter => "geo filter",
            Self::Probe => "probe",
        })
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each endpoint is checked by the filter or probe stage.
    fn endpoint_checked(
        &self,
        stage: Stage,
        endpoint: &Endpoint,
        passed: bool,
        current: usize,
        total: usize,
    );
    /// Called when the run ends, early or not.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn endpoint_checked(
        &self,
        _stage: Stage,
        _endpoint: &Endpoint,
        _passed: bool,
        _current: usize,
        _total: usize,
    ) {
    }
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything one run needs, resolved from the config file, environment and
/// CLI flags. Service URLs live here so tests can point stages at fakes.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub discovery: DiscoveryOptions,
    pub geo: GeoOptions,
    /// Pause between consecutive geo lookups.
    pub geo_delay: Duration,
    pub liveness: LivenessOptions,
    /// Concurrent liveness probes.
    pub workers: usize,
    pub endpoints_file: PathBuf,
    pub playlist_file: PathBuf,
    pub template_file: PathBuf,
    /// Fewer live relays than this ends the run before any write.
    pub min_live_endpoints: usize,
    /// `None` disables the downstream trigger.
    pub trigger: Option<TriggerOptions>,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            discovery: DiscoveryOptions::from_config(&config.search),
            geo: GeoOptions::from(&config.geo),
            geo_delay: Duration::from_millis(config.geo.delay_ms),
            liveness: LivenessOptions::from(&config.probe),
            workers: config.probe.workers,
            endpoints_file: config.output.endpoints_file.clone(),
            playlist_file: config.output.playlist_file.clone(),
            template_file: config.output.template_file.clone(),
            min_live_endpoints: config.output.min_live_endpoints,
            trigger: config
                .trigger
                .enabled
                .then(|| TriggerOptions::from_config(&config.trigger)),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// How far a run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Artifacts were written and handed to the sink.
    Completed,
    /// The given stage produced nothing; later stages did not run.
    StoppedEarly(Stage),
}

/// What happened at the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    NotAttempted,
    Published(PublishOutcome),
    Failed(String),
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Distinct candidates from discovery.
    pub candidates: usize,
    /// Candidates that passed the geo filter.
    pub geo_approved: usize,
    /// Live relays, sorted.
    pub live: Vec<Endpoint>,
    pub assembly: Option<AssemblyOutcome>,
    /// Files overwritten by this run.
    pub written: Vec<PathBuf>,
    pub outcome: RunOutcome,
    pub publish: PublishStatus,
    pub trigger: Option<TriggerOutcome>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            candidates: 0,
            geo_approved: 0,
            live: Vec::new(),
            assembly: None,
            written: Vec::new(),
            outcome: RunOutcome::Completed,
            publish: PublishStatus::NotAttempted,
            trigger: None,
        }
    }

    pub fn publish_failed(&self) -> bool {
        matches!(self.publish, PublishStatus::Failed(_))
    }

    pub fn trigger_failed(&self) -> bool {
        matches!(self.trigger, Some(TriggerOutcome::Failed { .. }))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full pipeline.
///
/// 1. Discovery: search for candidate relays
/// 2. Filter: sequential geo/ISP validation
/// 3. Probe: concurrent liveness checks, endpoints file written
/// 4. Assembly: playlist written from the template
/// 5. Publish: files handed to the sink
/// 6. Trigger: downstream workflow dispatched
///
/// `Err` means a local fault (client setup, file write). External services
/// failing only shrink the result.
#[instrument(skip_all, fields(workers = config.workers))]
pub async fn run_pipeline(
    config: &PipelineConfig,
    sink: &dyn ArtifactSink,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();
    let mut report = RunReport::new();

    info!(run_id = %report.run_id, sink = sink.name(), "starting run");

    // --- Phase 1: Discovery ---
    progress.phase("Searching for candidate relays");
    let candidates = relayscout_discovery::discover(&config.discovery).await?;
    report.candidates = candidates.len();

    if candidates.is_empty() {
        warn!("no candidates found; check the search query and cookie");
        return Ok(stop(report, Stage::Discovery, start, progress));
    }

    // --- Phase 2: Geo filter ---
    progress.phase("Checking relay locations");
    let validator = GeoValidator::new(config.geo.clone())?;
    let approved = filter_by_geo(&candidates, &validator, config.geo_delay, progress).await;
    report.geo_approved = approved.len();

    if approved.is_empty() {
        warn!(
            candidates = candidates.len(),
            "no candidate is in the target region and network"
        );
        return Ok(stop(report, Stage::Filter, start, progress));
    }

    // --- Phase 3: Liveness probe ---
    progress.phase("Probing relay status pages");
    let probed = run_probe_stage(
        &approved,
        &config.liveness,
        config.workers,
        config.min_live_endpoints,
        &config.endpoints_file,
        progress,
    )
    .await?;

    let live = match probed {
        ProbeStageOutcome::Persisted { live } => live,
        ProbeStageOutcome::Insufficient { live } => {
            warn!(
                approved = approved.len(),
                live = live.len(),
                "too few relays online, nothing published"
            );
            report.live = live;
            return Ok(stop(report, Stage::Probe, start, progress));
        }
    };
    report.written.push(config.endpoints_file.clone());

    // --- Phase 4: Assembly ---
    progress.phase("Assembling playlist");
    let assembly = assemble_playlist(&live, &config.template_file, &config.playlist_file)?;
    if let Some(path) = assembly.written_path() {
        report.written.push(path.to_path_buf());
    }
    report.assembly = Some(assembly);
    report.live = live;

    // --- Phase 5: Publish ---
    progress.phase("Publishing artifacts");
    report.publish = match sink.publish(&report.written).await {
        Ok(outcome) => PublishStatus::Published(outcome),
        Err(e) => {
            error!(error = %e, sink = sink.name(), "publishing failed");
            PublishStatus::Failed(e.to_string())
        }
    };

    // --- Phase 6: Downstream trigger ---
    if let Some(trigger) = &config.trigger {
        progress.phase("Triggering downstream workflow");
        let result = relayscout_publish::trigger_workflow(trigger).await;
        report.trigger = Some(trigger_outcome(&trigger.branch, result));
    }

    report.elapsed = start.elapsed();
    info!(
        run_id = %report.run_id,
        candidates = report.candidates,
        geo_approved = report.geo_approved,
        live = report.live.len(),
        written = report.written.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "run completed"
    );
    progress.done(&report);

    Ok(report)
}

/// Record a dispatch that could not be sent as a failed trigger.
fn trigger_outcome(branch: &str, result: Result<TriggerOutcome>) -> TriggerOutcome {
    result.unwrap_or_else(|e| {
        error!(error = %e, "workflow trigger could not be sent");
        TriggerOutcome::Failed {
            branch: branch.to_string(),
            status: None,
            message: e.to_string(),
        }
    })
}

/// Finish a run that ended at `stage`.
fn stop(
    mut report: RunReport,
    stage: Stage,
    start: Instant,
    progress: &dyn ProgressReporter,
) -> RunReport {
    report.outcome = RunOutcome::StoppedEarly(stage);
    report.elapsed = start.elapsed();
    info!(run_id = %report.run_id, %stage, "run stopped early, later stages skipped");
    progress.done(&report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    use relayscout_publish::NoopSink;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rs-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(search: &MockServer, geo: &MockServer, out: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            discovery: DiscoveryOptions {
                base_url: format!("{}/result", search.uri()),
                query: "udpxy".into(),
                user_agent: "Mozilla/5.0 (test)".into(),
                cookie: None,
                timeout: Duration::from_secs(5),
            },
            geo: GeoOptions {
                base_url: geo.uri(),
                lang: "zh-CN".into(),
                region: "广东".into(),
                isp_keywords: vec!["chinanet".into()],
                timeout: Duration::from_secs(5),
            },
            geo_delay: Duration::ZERO,
            liveness: LivenessOptions {
                status_paths: vec!["/stat".into(), "/status".into()],
                user_agent: "Wget/1.14".into(),
                body_keywords: vec!["udpxy".into(), "client".into()],
                timeout: Duration::from_secs(2),
                follow_redirects: false,
            },
            workers: 4,
            endpoints_file: out.join("source-ip.txt"),
            playlist_file: out.join("source-m3u.txt"),
            template_file: out.join("template.txt"),
            min_live_endpoints: 1,
            trigger: None,
        }
    }

    /// A geo service that places every host in the target region.
    async fn geo_all_match() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(path_regex(r"^/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "regionName": "广东省", "isp": "Chinanet", "org": ""
            })))
            .mount(&server)
            .await;
        server
    }

    async fn search_returning(body: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/result"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn full_run_writes_and_publishes() {
        let relay = MockServer::start().await;
        Mock::given(path("/stat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("udpxy status"))
            .mount(&relay)
            .await;
        let relay_addr = relay.address().to_string();

        // 127.0.0.1:9 is discovered and geo-approved but refuses connections.
        let search = search_returning(format!("<a>{relay_addr}</a> <a>127.0.0.1:9</a>")).await;
        let geo = geo_all_match().await;
        let out = temp_dir();
        std::fs::write(out.join("template.txt"), "CCTV1,rtp://239.1.1.1:1234\nGDTV,udp://239.2.2.2:5000\n").unwrap();

        let sink = NoopSink::new();
        let report = run_pipeline(&config(&search, &geo, &out), &sink, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.geo_approved, 2);
        assert_eq!(report.live.len(), 1);
        assert_eq!(report.publish, PublishStatus::Published(PublishOutcome::Discarded));

        assert_eq!(
            std::fs::read_to_string(out.join("source-ip.txt")).unwrap(),
            relay_addr
        );
        assert_eq!(
            std::fs::read_to_string(out.join("source-m3u.txt")).unwrap(),
            format!(
                "CCTV1,http://{relay_addr}/rtp/239.1.1.1:1234\nGDTV,http://{relay_addr}/udp/239.2.2.2:5000"
            )
        );
        assert_eq!(
            sink.calls(),
            vec![vec![out.join("source-ip.txt"), out.join("source-m3u.txt")]]
        );

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn no_candidates_stops_at_discovery() {
        let search = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&search)
            .await;
        let geo = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&geo)
            .await;
        let out = temp_dir();

        let sink = NoopSink::new();
        let report = run_pipeline(&config(&search, &geo, &out), &sink, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::StoppedEarly(Stage::Discovery));
        assert_eq!(report.publish, PublishStatus::NotAttempted);
        assert!(sink.calls().is_empty());

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn no_geo_match_stops_at_filter() {
        let search = search_returning("1.2.3.4:8888".into()).await;
        let geo = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "regionName": "北京市", "isp": "Chinanet", "org": ""
            })))
            .mount(&geo)
            .await;
        let out = temp_dir();

        let report = run_pipeline(&config(&search, &geo, &out), &NoopSink::new(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::StoppedEarly(Stage::Filter));
        assert_eq!(report.candidates, 1);
        assert!(!out.join("source-ip.txt").exists());

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn all_dead_keeps_previous_outputs() {
        let search = search_returning("127.0.0.1:9".into()).await;
        let geo = geo_all_match().await;
        let out = temp_dir();
        std::fs::write(out.join("source-ip.txt"), "5.5.5.5:5555").unwrap();
        std::fs::write(out.join("source-m3u.txt"), "A,http://5.5.5.5:5555/rtp/x").unwrap();
        std::fs::write(out.join("template.txt"), "CCTV1,rtp://239.1.1.1:1234").unwrap();

        let sink = NoopSink::new();
        let report = run_pipeline(&config(&search, &geo, &out), &sink, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::StoppedEarly(Stage::Probe));
        assert!(sink.calls().is_empty());
        assert_eq!(
            std::fs::read_to_string(out.join("source-ip.txt")).unwrap(),
            "5.5.5.5:5555"
        );
        assert_eq!(
            std::fs::read_to_string(out.join("source-m3u.txt")).unwrap(),
            "A,http://5.5.5.5:5555/rtp/x"
        );

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn missing_template_still_publishes_endpoints() {
        let relay = MockServer::start().await;
        Mock::given(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Active clients: 0"))
            .mount(&relay)
            .await;
        let search = search_returning(relay.address().to_string()).await;
        let geo = geo_all_match().await;
        let out = temp_dir();

        let sink = NoopSink::new();
        let report = run_pipeline(&config(&search, &geo, &out), &sink, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(matches!(
            report.assembly,
            Some(AssemblyOutcome::TemplateMissing { .. })
        ));
        assert_eq!(sink.calls(), vec![vec![out.join("source-ip.txt")]]);
        assert!(!out.join("source-m3u.txt").exists());

        let _ = std::fs::remove_dir_all(&out);
    }

    #[test]
    fn unsendable_trigger_is_recorded_as_failed() {
        let err = relayscout_shared::RelayScoutError::Network("client build failed".into());
        let outcome = trigger_outcome("main", Err(err));
        assert!(matches!(
            outcome,
            TriggerOutcome::Failed { ref branch, status: None, ref message }
                if branch == "main" && message.contains("client build failed")
        ));
    }

    #[tokio::test]
    async fn unreachable_trigger_keeps_the_report() {
        let relay = MockServer::start().await;
        Mock::given(path("/stat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("udpxy"))
            .mount(&relay)
            .await;
        let search = search_returning(relay.address().to_string()).await;
        let geo = geo_all_match().await;
        let out = temp_dir();

        let mut cfg = config(&search, &geo, &out);
        cfg.trigger = Some(TriggerOptions {
            api_base_url: "http://127.0.0.1:9".into(),
            repository: "acme/iptv-api".into(),
            workflow: "main.yml".into(),
            branch: "main".into(),
            fallback_branch: None,
            token: Some("ghp_test".into()),
        });

        let sink = NoopSink::new();
        let report = run_pipeline(&cfg, &sink, &SilentProgress).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.publish, PublishStatus::Published(PublishOutcome::Discarded));
        assert!(report.trigger_failed());
        assert_eq!(sink.calls().len(), 1);

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn trigger_runs_after_publish() {
        let relay = MockServer::start().await;
        Mock::given(path("/stat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("udpxy"))
            .mount(&relay)
            .await;
        let search = search_returning(relay.address().to_string()).await;
        let geo = geo_all_match().await;
        let api = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/iptv-api/actions/workflows/main.yml/dispatches"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&api)
            .await;
        let out = temp_dir();

        let mut cfg = config(&search, &geo, &out);
        cfg.trigger = Some(TriggerOptions {
            api_base_url: api.uri(),
            repository: "acme/iptv-api".into(),
            workflow: "main.yml".into(),
            branch: "main".into(),
            fallback_branch: Some("master".into()),
            token: Some("ghp_test".into()),
        });

        let report = run_pipeline(&cfg, &NoopSink::new(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(
            report.trigger,
            Some(TriggerOutcome::Dispatched { branch: "main".into() })
        );
        assert!(!report.trigger_failed());

        let _ = std::fs::remove_dir_all(&out);
    }
}

//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use relayscout_core::assembler::{AssemblyOutcome, assemble_playlist};
use relayscout_core::pipeline::{
    PipelineConfig, ProgressReporter, PublishStatus, RunOutcome, RunReport, Stage,
};
use relayscout_discovery::DiscoveryOptions;
use relayscout_probe::{GeoOptions, GeoValidator, LivenessOptions, LivenessProber};
use relayscout_publish::{ArtifactSink, GitSink, NoopSink, TriggerOptions, TriggerOutcome};
use relayscout_shared::{
    AppConfig, Endpoint, MAX_PROBE_WORKERS, init_config, load_config, load_config_from,
    validate_config,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// relayscout: find live udpxy relays and publish an IPTV playlist.
#[derive(Parser)]
#[command(
    name = "relayscout",
    version,
    about = "Discover, validate and publish udpxy IPTV relays.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.relayscout/relayscout.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline: discover, filter, probe, assemble, publish.
    Run {
        /// Write files locally but do not commit or push them.
        #[arg(long)]
        no_publish: bool,

        /// Do not dispatch the downstream workflow.
        #[arg(long)]
        no_trigger: bool,

        /// Concurrent liveness probes (overrides probe.workers).
        #[arg(long)]
        workers: Option<usize>,

        /// Fail the run when publishing or the trigger fails.
        #[arg(long)]
        strict: bool,
    },

    /// Search for candidate relays and print them.
    Discover,

    /// Geo-check and probe the given relays without writing anything.
    Check {
        /// Relays as host:port.
        #[arg(required = true)]
        endpoints: Vec<String>,
    },

    /// Rebuild the playlist from an existing endpoints file.
    Assemble {
        /// Endpoints file (defaults to output.endpoints_file).
        #[arg(long)]
        endpoints: Option<PathBuf>,
    },

    /// Dispatch the downstream workflow only.
    Trigger,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "relayscout=info",
        1 => "relayscout=debug",
        _ => "relayscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            no_publish,
            no_trigger,
            workers,
            strict,
        } => cmd_run(config_path, no_publish, no_trigger, workers, strict).await,
        Command::Discover => cmd_discover(config_path).await,
        Command::Check { endpoints } => cmd_check(config_path, &endpoints).await,
        Command::Assemble { endpoints } => cmd_assemble(config_path, endpoints.as_deref()),
        Command::Trigger => cmd_trigger(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Load `--config` if given, else the user config or defaults.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    validate_config(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    no_publish: bool,
    no_trigger: bool,
    workers: Option<usize>,
    strict: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut pipeline = PipelineConfig::from(&config);
    if let Some(n) = workers {
        if !(1..=MAX_PROBE_WORKERS).contains(&n) {
            return Err(eyre!("--workers must be between 1 and {MAX_PROBE_WORKERS}"));
        }
        pipeline.workers = n;
    }
    if no_trigger {
        pipeline.trigger = None;
    }

    let sink: Box<dyn ArtifactSink> = if no_publish || !config.publish.enabled {
        Box::new(NoopSink::new())
    } else {
        Box::new(GitSink::from(&config.publish))
    };

    info!(
        sink = sink.name(),
        workers = pipeline.workers,
        trigger = pipeline.trigger.is_some(),
        "starting relay scan"
    );

    let reporter = CliProgress::new();
    let report = relayscout_core::pipeline::run_pipeline(&pipeline, sink.as_ref(), &reporter).await?;

    print_report(&report);

    if strict {
        if let PublishStatus::Failed(msg) = &report.publish {
            return Err(eyre!("publishing failed: {msg}"));
        }
        if let Some(outcome @ TriggerOutcome::Failed { .. }) = &report.trigger {
            return Err(eyre!("workflow trigger {outcome}"));
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    match report.outcome {
        RunOutcome::Completed => println!("  Run completed."),
        RunOutcome::StoppedEarly(stage) => {
            println!("  Run stopped after {stage}; previous outputs kept.")
        }
    }
    println!("  Run:        {}", report.run_id);
    println!(
        "  Started:    {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Candidates: {}", report.candidates);
    println!("  Geo match:  {}", report.geo_approved);
    println!("  Live:       {}", report.live.len());
    match &report.assembly {
        Some(AssemblyOutcome::Written { entries, .. }) => println!("  Playlist:   {entries} entries"),
        Some(AssemblyOutcome::TemplateMissing { path }) => {
            println!("  Playlist:   skipped, no template at {}", path.display())
        }
        Some(AssemblyOutcome::Empty) => println!("  Playlist:   empty, not written"),
        None => {}
    }
    for path in &report.written {
        println!("  Wrote:      {}", path.display());
    }
    match &report.publish {
        PublishStatus::NotAttempted => {}
        PublishStatus::Published(outcome) => println!("  Publish:    {outcome}"),
        PublishStatus::Failed(msg) => println!("  Publish:    failed: {msg}"),
    }
    if let Some(trigger) = &report.trigger {
        println!("  Trigger:    {trigger}");
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_discover(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let opts = DiscoveryOptions::from_config(&config.search);

    let candidates = relayscout_discovery::discover(&opts).await?;
    info!(count = candidates.len(), "candidates found");

    for endpoint in &candidates {
        println!("{endpoint}");
    }
    Ok(())
}

async fn cmd_check(config_path: Option<&Path>, raw: &[String]) -> Result<()> {
    let config = resolve_config(config_path)?;

    let endpoints = raw
        .iter()
        .map(|s| s.parse::<Endpoint>().map_err(|e| eyre!("{e}")))
        .collect::<Result<Vec<_>>>()?;

    let validator = GeoValidator::new(GeoOptions::from(&config.geo))?;
    let prober = LivenessProber::new(&LivenessOptions::from(&config.probe))?;
    let delay = Duration::from_millis(config.geo.delay_ms);

    for (i, endpoint) in endpoints.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        let geo = validator.check(endpoint.host()).await;
        let liveness = prober.probe(endpoint).await;
        println!("{endpoint}");
        println!("  geo:      {geo}");
        println!("  liveness: {liveness}");
    }
    Ok(())
}

fn cmd_assemble(config_path: Option<&Path>, endpoints_file: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let source = endpoints_file.unwrap_or(config.output.endpoints_file.as_path());

    let endpoints = relayscout_artifacts::read_endpoints(source)?;
    if endpoints.is_empty() {
        return Err(eyre!("no endpoints in {}", source.display()));
    }

    let outcome = assemble_playlist(
        &endpoints,
        &config.output.template_file,
        &config.output.playlist_file,
    )?;

    match outcome {
        AssemblyOutcome::Written { path, entries } => {
            println!("Playlist written: {} ({entries} entries)", path.display())
        }
        AssemblyOutcome::TemplateMissing { path } => {
            return Err(eyre!("channel template not found: {}", path.display()));
        }
        AssemblyOutcome::Empty => println!("Template produced no entries; playlist not written"),
    }
    Ok(())
}

async fn cmd_trigger(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let opts = TriggerOptions::from_config(&config.trigger);

    let outcome = relayscout_publish::trigger_workflow(&opts).await?;
    println!("Workflow {}: {outcome}", opts.workflow);

    if let TriggerOutcome::Failed { .. } = outcome {
        return Err(eyre!("workflow trigger {outcome}"));
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn endpoint_checked(
        &self,
        stage: Stage,
        endpoint: &Endpoint,
        passed: bool,
        current: usize,
        total: usize,
    ) {
        let mark = if passed { "ok" } else { "--" };
        self.spinner
            .set_message(format!("{stage} [{current}/{total}] {endpoint} {mark}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

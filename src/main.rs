//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror site mirroring crawler.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use sumi_mirror::config::{load_config_with_hash, Config, FtpPolicy};
use sumi_mirror::output::{print_statistics, StatSink};
use sumi_mirror::server::{AdminServer, CommandDispatcher, Endpoint, DEFAULT_TCP_PORT};
use sumi_mirror::{Pipeline, ShutdownReason, ShutdownSignal};
use tracing_subscriber::EnvFilter;

/// How progress is shown while mirroring
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DisplayMode {
    /// Log lines only
    Log,
    /// A periodically refreshed status line on stderr
    Status,
    /// Errors only, no final report
    Quiet,
}

/// Sumi-Mirror: an incremental site mirroring crawler
///
/// Sumi-Mirror walks HTTP(S) index pages and FTP trees from the given seed
/// URLs, filters discovered links against prefix patterns, and downloads
/// them into a local mirror, skipping files that are already current.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version)]
#[command(about = "An incremental site mirroring crawler", long_about = None)]
struct Cli {
    /// Seed URLs (http, https or ftp)
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Only fetch links matching this regex prefix (repeatable)
    #[arg(short, long = "pattern", value_name = "RE")]
    patterns: Vec<String>,

    /// Descend into relative directory links
    #[arg(short, long)]
    recursive: bool,

    /// Strip N leading path components (the host counts as one); also accepts -tL N
    #[arg(short = 'L', long, value_name = "N")]
    trim_lead: Option<usize>,

    /// Do not create the host directory (same as --trim-lead 1); also accepts -tH
    #[arg(long, conflicts_with = "trim_lead")]
    trim_host: bool,

    /// Mirror root directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Number of Site Scrubber workers
    #[arg(long, value_name = "N")]
    scrubbers: Option<usize>,

    /// Number of Link Filter workers
    #[arg(long, value_name = "N")]
    filters: Option<usize>,

    /// Number of Fetcher workers
    #[arg(long, value_name = "N")]
    fetchers: Option<usize>,

    /// How existing FTP files are checked
    #[arg(long, value_enum)]
    ftp_policy: Option<FtpPolicy>,

    /// Allow the same directory URL to be scrubbed more than once
    #[arg(long)]
    no_dedupe: bool,

    /// Stop a pool once its queue has been empty this long (0 disables)
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Stop the whole run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Progress display
    #[arg(long, value_enum, default_value = "log")]
    display: DisplayMode,

    /// Serve admin commands on a Unix socket (-u for the default path, --unix=PATH otherwise)
    #[cfg(unix)]
    #[arg(
        short,
        long,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true,
        conflicts_with = "bind"
    )]
    unix: Option<Option<PathBuf>>,

    /// Serve admin commands on this TCP address (port defaults to 9765)
    #[arg(short, long, value_name = "HOST[:PORT]", value_parser = parse_bind)]
    bind: Option<SocketAddr>,

    /// Validate configuration and show what would be mirrored without fetching
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(rewrite_legacy_args(std::env::args()));

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet, cli.display);

    match run(cli).await {
        Ok(Some(reason)) => ExitCode::from(exit_status(reason)),
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Rewrites the legacy `-tL N` / `-tLN` spelling to `--trim-lead`
fn rewrite_legacy_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-tH" {
                return "--trim-host".to_string();
            }
            match arg.strip_prefix("-tL") {
                Some("") => "--trim-lead".to_string(),
                Some(rest) => format!("--trim-lead={}", rest.trim_start_matches('=')),
                None => arg,
            }
        })
        .collect()
}

/// Parses `HOST:PORT`, or a bare `HOST` on the default admin port
fn parse_bind(value: &str) -> Result<SocketAddr, String> {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_TCP_PORT))
        .map_err(|_| format!("expected HOST or HOST:PORT, got '{}'", value))
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, display: DisplayMode) {
    let filter = if quiet || display == DisplayMode::Quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match (verbose, display) {
            (0, DisplayMode::Status) => EnvFilter::new("sumi_mirror=warn,error"),
            (0, _) => EnvFilter::new("sumi_mirror=info,warn"),
            (1, _) => EnvFilter::new("sumi_mirror=debug,info"),
            (2, _) => EnvFilter::new("sumi_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Maps the shutdown reason to the process exit status
fn exit_status(reason: ShutdownReason) -> u8 {
    match reason {
        ShutdownReason::Drained | ShutdownReason::IdleTimeout { .. } => 0,
        ShutdownReason::Timeout => 2,
        ShutdownReason::Interrupted => 130,
    }
}

/// Layers command-line flags over the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if !cli.patterns.is_empty() {
        config.filter.patterns = cli.patterns.clone();
    }
    if cli.recursive {
        config.crawler.recursive = true;
    }
    if cli.no_dedupe {
        config.crawler.dedupe_frontier = false;
    }
    if let Some(trim_lead) = cli.trim_lead {
        config.output.trim_lead = trim_lead;
    }
    if cli.trim_host {
        config.output.trim_lead = 1;
    }
    if let Some(output) = &cli.output {
        config.output.root = output.clone();
    }
    if let Some(policy) = cli.ftp_policy {
        config.output.ftp_policy = policy;
    }
    if let Some(n) = cli.scrubbers {
        config.crawler.scrubbers = n;
    }
    if let Some(n) = cli.filters {
        config.crawler.filters = n;
    }
    if let Some(n) = cli.fetchers {
        config.crawler.fetchers = n;
    }
    if let Some(secs) = cli.idle_timeout {
        config.crawler.idle_timeout_secs = secs;
    }
}

fn admin_endpoint(cli: &Cli) -> Option<Endpoint> {
    #[cfg(unix)]
    if let Some(path) = &cli.unix {
        let path = path
            .clone()
            .unwrap_or_else(|| sumi_mirror::server::default_socket_path("admin"));
        return Some(Endpoint::Unix(path));
    }
    cli.bind.map(Endpoint::Tcp)
}

/// Runs the mirror; `None` means nothing was crawled (dry run)
async fn run(cli: Cli) -> Result<Option<ShutdownReason>> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli);

    if cli.dry_run {
        handle_dry_run(&config, &cli.urls)?;
        return Ok(None);
    }

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let signal = pipeline.shutdown_signal();
    let stats = pipeline.stats();

    if let Some(endpoint) = admin_endpoint(&cli) {
        let dispatcher = CommandDispatcher::with_builtins(Arc::clone(&stats));
        let server = AdminServer::bind(endpoint, dispatcher)
            .await
            .context("Failed to start admin server")?;
        tokio::spawn(server.run(signal.clone()));
    }

    spawn_interrupt_handler(signal.clone());
    if let Some(secs) = cli.timeout {
        spawn_timeout(signal.clone(), Duration::from_secs(secs));
    }
    if cli.display == DisplayMode::Status {
        spawn_status_line(signal.clone(), Arc::clone(&stats));
    }

    let report = pipeline.run(&cli.urls).await?;

    if cli.display == DisplayMode::Status {
        eprintln!();
    }
    if report.abandoned > 0 {
        tracing::warn!("{} queued items were not processed", report.abandoned);
    }
    if cli.display != DisplayMode::Quiet && !cli.quiet {
        print_statistics(&report.stats);
    }

    Ok(Some(report.reason))
}

fn spawn_interrupt_handler(signal: ShutdownSignal) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                if signal.raise(ShutdownReason::Interrupted) {
                    tracing::warn!("Interrupted, finishing in-flight items");
                }
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

fn spawn_timeout(signal: ShutdownSignal, after: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(after) => {
                if signal.raise(ShutdownReason::Timeout) {
                    tracing::warn!("Timeout of {:?} reached, stopping", after);
                }
            }
            _ = signal.wait() => {}
        }
    });
}

fn spawn_status_line(signal: ShutdownSignal, stats: Arc<StatSink>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    eprint!("\r{}", stats.snapshot().summary_line());
                }
                _ = signal.wait() => break,
            }
        }
    });
}

/// Handles the --dry-run mode: validates config and shows what would be mirrored
fn handle_dry_run(config: &Config, urls: &[String]) -> Result<()> {
    sumi_mirror::config::validate(config).context("Invalid configuration")?;
    for url in urls {
        sumi_mirror::config::validate_seed(url)?;
    }

    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Workers:");
    println!("  Scrubbers: {}", config.crawler.scrubbers);
    println!("  Filters: {}", config.crawler.filters);
    println!("  Fetchers: {}", config.crawler.fetchers);
    println!("  Recursive: {}", config.crawler.recursive);
    println!("  Frontier dedupe: {}", config.crawler.dedupe_frontier);

    println!("\nOutput:");
    println!("  Root: {}", config.output.root);
    println!("  Trim lead: {}", config.output.trim_lead);
    println!("  FTP policy: {:?}", config.output.ftp_policy);

    println!("\nPatterns ({}):", config.filter.patterns.len());
    if config.filter.patterns.is_empty() {
        println!("  (accept everything)");
    }
    for pattern in &config.filter.patterns {
        println!("  - {}", pattern);
    }

    println!("\nSeeds ({}):", urls.len());
    for url in urls {
        println!("  - {}", sumi_mirror::normalize_url(url));
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

use serde::Deserialize;

/// Main configuration structure for Sumi-Mirror
///
/// Every section is optional in the TOML file; missing sections fall back to
/// their defaults and command-line flags are layered on top afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

/// Worker pool sizing and pipeline behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of Site Scrubber workers
    pub scrubbers: usize,

    /// Number of Link Filter workers
    pub filters: usize,

    /// Number of Fetcher workers
    pub fetchers: usize,

    /// Descend into relative directory links found on index pages
    pub recursive: bool,

    /// Keep a visited-set of directory URLs so circular listings terminate
    #[serde(rename = "dedupe-frontier")]
    pub dedupe_frontier: bool,

    /// Bounded wait on a queue before re-checking the shutdown signal (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// A pool idle for this long raises the shutdown signal on its own (0 disables)
    #[serde(rename = "idle-timeout-secs")]
    pub idle_timeout_secs: u64,

    /// How often the driver logs a progress line (0 disables)
    #[serde(rename = "progress-interval-secs")]
    pub progress_interval_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            scrubbers: 2,
            filters: 8,
            fetchers: 2,
            recursive: false,
            dedupe_frontier: true,
            poll_interval_ms: 100,
            idle_timeout_secs: 0,
            progress_interval_secs: 5,
        }
    }
}

/// HTTP/FTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// User-Agent header sent with every HTTP request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// TCP connect timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Explicit proxy; when unset the HTTP_PROXY/HTTPS_PROXY environment is used
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            proxy: None,
        }
    }
}

/// How an FTP resource that already exists locally is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FtpPolicy {
    /// Always download again
    Always,
    /// Ask the server for the file size and skip when it matches
    #[default]
    SizeCheck,
}

/// Local mirror layout
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the mirror tree is written under
    pub root: String,

    /// Number of leading path components (host first) stripped from output paths
    #[serde(rename = "trim-lead")]
    pub trim_lead: usize,

    /// Incremental policy for existing FTP files
    #[serde(rename = "ftp-policy")]
    pub ftp_policy: FtpPolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            trim_lead: 0,
            ftp_policy: FtpPolicy::SizeCheck,
        }
    }
}

/// Link filter patterns
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Regular expressions matched as anchored prefixes; empty accepts everything
    pub patterns: Vec<String>,
}

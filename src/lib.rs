//! Sumi-Mirror: an incremental site mirroring crawler
//!
//! This crate walks HTTP(S) index pages and FTP trees from a set of seed URLs,
//! filters the discovered resources against prefix patterns, and downloads
//! them into a local mirror, skipping files whose local copy is already current.

pub mod config;
pub mod crawler;
pub mod output;
pub mod server;
pub mod transport;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Admin server error: {0}")]
    Server(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid link pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Errors raised by the HTTP and FTP transports
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("FTP error for {url}: {source}")]
    Ftp {
        url: String,
        source: suppaftp::FtpError,
    },

    #[error("Invalid transfer URL: {0}")]
    Url(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking transfer task failed: {0}")]
    Join(String),
}

/// Result type alias for Sumi-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Result type alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchResult, Pipeline, PipelineReport, ShutdownReason, ShutdownSignal};
pub use output::{CrawlEvent, StatSink, StatsSnapshot};
pub use url::{normalize_url, LinkKind, Scheme};

//! Network transports for Sumi-Mirror
//!
//! HTTP(S) goes through a shared reqwest client; FTP sessions are opened per
//! operation with suppaftp on the blocking pool. [`Transport`] hides the
//! scheme split from the workers.

mod ftp;
mod http;

pub use ftp::{
    ftp_download, ftp_fetch, ftp_remote_size, ftp_size, ftp_walk, FtpListing, FtpTarget,
    FtpWalker, ANONYMOUS_PASSWORD, ANONYMOUS_USER,
};
#[cfg(test)]
pub(crate) use ftp::test_server;
pub use http::{build_http_client, http_download, http_get_text, http_head_length, Page};

use crate::config::TransportConfig;
use crate::url::Scheme;
use crate::TransportResult;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

/// Shared handle used by every worker pool
///
/// Cloning is cheap: the reqwest client is reference counted.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    ftp_timeout: Duration,
}

impl Transport {
    /// Builds the transport from configuration
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            ftp_timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Fetches an HTTP index page, following redirects
    pub async fn get_page(&self, url: &str) -> TransportResult<Page> {
        http_get_text(&self.client, url).await
    }

    /// Starts listing every file below an FTP URL
    pub fn walk_ftp(&self, url: &str) -> TransportResult<FtpListing> {
        ftp_walk(url, self.ftp_timeout)
    }

    /// Remote size of a resource: HEAD `Content-Length` or FTP SIZE
    pub async fn remote_size(&self, scheme: Scheme, url: &str) -> TransportResult<Option<u64>> {
        match scheme {
            Scheme::Http | Scheme::Https => http_head_length(&self.client, url).await,
            Scheme::Ftp => ftp_remote_size(url, self.ftp_timeout).await,
        }
    }

    /// Downloads a resource into `dest`, returning the byte count
    pub async fn download(&self, scheme: Scheme, url: &str, dest: &Path) -> TransportResult<u64> {
        match scheme {
            Scheme::Http | Scheme::Https => http_download(&self.client, url, dest).await,
            Scheme::Ftp => ftp_fetch(url, dest.to_path_buf(), self.ftp_timeout).await,
        }
    }
}

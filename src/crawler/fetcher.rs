//! Incremental fetcher
//!
//! This module decides whether a resource needs downloading and performs
//! the download:
//! - Deriving the local mirror path from host + path
//! - Comparing local size against HEAD `Content-Length` or FTP `SIZE`
//! - Streaming the body into a truncated local file
//! - Classifying failures by severity for logging

use super::pool::Inbox;
use crate::config::{FtpPolicy, OutputConfig};
use crate::output::{CrawlEvent, StatSink};
use crate::transport::Transport;
use crate::url::{output_path, Scheme};
use crate::{MirrorError, TransportError, UrlError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Outcome of one successfully processed Fetch Queue item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    /// The URL that was fetched
    pub url: String,
    /// Where the file lives in the mirror
    pub local_path: PathBuf,
    /// Size of the local file after processing
    pub byte_size: u64,
    /// True if the local copy matched the remote and no download happened
    pub was_already_current: bool,
}

/// Downloads resources into the mirror, skipping current copies
#[derive(Debug, Clone)]
pub struct Fetcher {
    root: PathBuf,
    trim_lead: usize,
    ftp_policy: FtpPolicy,
    transport: Transport,
}

impl Fetcher {
    pub fn new(output: &OutputConfig, transport: Transport) -> Self {
        Self {
            root: PathBuf::from(&output.root),
            trim_lead: output.trim_lead,
            ftp_policy: output.ftp_policy,
            transport,
        }
    }

    /// Fetches a URL into the mirror unless the local copy is current
    ///
    /// # Decision Rule
    ///
    /// 1. Local file missing → download
    /// 2. HTTP(S) → HEAD; download unless `Content-Length` equals the local size
    /// 3. FTP with [`FtpPolicy::SizeCheck`] → `SIZE`; download unless it equals the local size
    /// 4. FTP with [`FtpPolicy::Always`] → download
    ///
    /// A missing `Content-Length` or a refused `SIZE` also leads to a download.
    ///
    /// # Errors
    ///
    /// * [`MirrorError::UrlError`] - Unparsable URL or unsupported scheme
    /// * [`MirrorError::Io`] - The destination directory could not be created
    /// * [`MirrorError::Transport`] - Network failure, non-success status or local write failure
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, MirrorError> {
        let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;
        let scheme = Scheme::of(&parsed)
            .ok_or_else(|| UrlError::InvalidScheme(parsed.scheme().to_string()))?;
        let local_path = output_path(&self.root, url, self.trim_lead)?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let local_size = match tokio::fs::metadata(&local_path).await {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            _ => None,
        };

        if let Some(local_size) = local_size {
            if self.is_current(scheme, url, local_size).await? {
                debug!("{} is current ({} bytes)", url, local_size);
                return Ok(FetchResult {
                    url: url.to_string(),
                    local_path,
                    byte_size: local_size,
                    was_already_current: true,
                });
            }
        }

        let written = self.transport.download(scheme, url, &local_path).await?;
        debug!("Saved {} to {} ({} bytes)", url, local_path.display(), written);

        Ok(FetchResult {
            url: url.to_string(),
            local_path,
            byte_size: written,
            was_already_current: false,
        })
    }

    /// Compares the remote size with an existing local copy
    async fn is_current(
        &self,
        scheme: Scheme,
        url: &str,
        local_size: u64,
    ) -> Result<bool, TransportError> {
        if scheme == Scheme::Ftp && self.ftp_policy == FtpPolicy::Always {
            return Ok(false);
        }

        match self.transport.remote_size(scheme, url).await? {
            Some(remote_size) => Ok(remote_size == local_size),
            None => {
                debug!("No remote size for {}, fetching again", url);
                Ok(false)
            }
        }
    }
}

/// True for failures that may have left a truncated file behind
fn is_local_io_failure(error: &MirrorError) -> bool {
    matches!(
        error,
        MirrorError::Io(_) | MirrorError::Transport(TransportError::Io(_))
    )
}

/// One Fetcher worker
pub(crate) struct FetchWorker {
    pub(crate) id: usize,
    pub(crate) inbox: Inbox<String>,
    pub(crate) fetcher: Fetcher,
    pub(crate) stats: Arc<StatSink>,
}

impl FetchWorker {
    pub(crate) async fn run(mut self) {
        while let Some(url) = self.inbox.next().await {
            match self.fetcher.fetch(&url).await {
                Ok(result) => {
                    if result.was_already_current {
                        info!("Have {}", result.local_path.display());
                    } else {
                        info!(
                            "Saved {} ({} bytes)",
                            result.local_path.display(),
                            result.byte_size
                        );
                    }
                    self.stats.record(CrawlEvent::Fetched(result));
                }
                Err(e) => {
                    if is_local_io_failure(&e) {
                        error!("Local write failed for {}, file may be incomplete: {}", *url, e);
                    } else {
                        warn!("Fetch failed for {}: {}", *url, e);
                    }
                    self.stats.record(CrawlEvent::FetchFailed {
                        worker_id: self.id,
                        url: url.as_str().to_owned(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!("Fetch worker {} exiting", self.id);
    }
}

//! Site Scrubber pool
//!
//! A scrubber takes a URL from the Frontier Queue, retrieves it, and sorts
//! what it finds: relative directories go back onto the frontier when
//! recursing, everything else goes to the Link Queue.

use super::parser::{extract_links, route, Route};
use super::pool::Inbox;
use super::queue::WorkQueue;
use crate::output::{CrawlEvent, StatSink};
use crate::transport::{FtpListing, Transport};
use crate::url::Scheme;
use crate::MirrorError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// The Frontier Queue plus an optional visited-set
///
/// With the visited-set enabled a directory URL is only ever queued once,
/// so circular listings terminate.
#[derive(Debug)]
pub struct Frontier {
    queue: Arc<WorkQueue<String>>,
    visited: Option<Mutex<HashSet<String>>>,
}

impl Frontier {
    pub fn new(queue: Arc<WorkQueue<String>>, dedupe: bool) -> Self {
        Self {
            queue,
            visited: dedupe.then(|| Mutex::new(HashSet::new())),
        }
    }

    /// Queues a normalized URL for scrubbing
    ///
    /// Returns false if the URL was already seen.
    pub fn push(&self, url: String) -> bool {
        if let Some(visited) = &self.visited {
            let mut visited = visited.lock().unwrap_or_else(|e| e.into_inner());
            if !visited.insert(url.clone()) {
                return false;
            }
        }
        self.queue.push(url);
        true
    }

    pub fn queue(&self) -> &Arc<WorkQueue<String>> {
        &self.queue
    }
}

/// Counts of what one scrub produced
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrubOutcome {
    pub frontier: usize,
    pub links: usize,
}

/// Retrieves frontier URLs and routes the links they contain
#[derive(Debug, Clone)]
pub struct Scrubber {
    frontier: Arc<Frontier>,
    link_queue: Arc<WorkQueue<String>>,
    transport: Transport,
    stats: Arc<StatSink>,
    recursive: bool,
}

impl Scrubber {
    pub fn new(
        frontier: Arc<Frontier>,
        link_queue: Arc<WorkQueue<String>>,
        transport: Transport,
        stats: Arc<StatSink>,
        recursive: bool,
    ) -> Self {
        Self {
            frontier,
            link_queue,
            transport,
            stats,
            recursive,
        }
    }

    /// Scrubs one frontier URL
    ///
    /// HTTP(S) pages are fetched and their anchors routed; FTP URLs are
    /// walked and every file found goes to the Link Queue. All pushes
    /// happen before this returns.
    pub async fn scrub(&self, url: &str) -> Result<ScrubOutcome, MirrorError> {
        let parsed = Url::parse(url)?;
        let scheme = Scheme::of(&parsed).ok_or_else(|| {
            crate::UrlError::InvalidScheme(format!("{} ({})", parsed.scheme(), url))
        })?;

        if scheme == Scheme::Ftp {
            let listing = self.transport.walk_ftp(url)?;
            return self.drain_listing(url, listing).await;
        }

        let page = self.transport.get_page(url).await?;
        let mut outcome = ScrubOutcome::default();

        for link in extract_links(&page.body, &page.url) {
            match route(&link, self.recursive) {
                Route::Frontier => {
                    if self.frontier.push(link.url.clone()) {
                        debug!("Descending into {}", link.url);
                        outcome.frontier += 1;
                    } else {
                        debug!("Already visited {}", link.url);
                    }
                }
                Route::LinkQueue => {
                    self.discover(link.url);
                    outcome.links += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Pushes FTP files onto the Link Queue as the walk reports them
    ///
    /// Files found before a failure stay queued; the failure is still
    /// returned so the scrub is counted as failed.
    async fn drain_listing(
        &self,
        url: &str,
        mut listing: FtpListing,
    ) -> Result<ScrubOutcome, MirrorError> {
        let mut outcome = ScrubOutcome::default();
        while let Some(file) = listing.next().await {
            self.discover(file);
            outcome.links += 1;
        }

        if let Err(e) = listing.finish().await {
            if outcome.links > 0 {
                warn!("Walk of {} stopped after {} files", url, outcome.links);
            }
            return Err(e.into());
        }
        Ok(outcome)
    }

    fn discover(&self, url: String) {
        debug!("Discovered {}", url);
        self.link_queue.push(url.clone());
        self.stats.record(CrawlEvent::LinkDiscovered { url });
    }
}

/// One Site Scrubber worker
pub(crate) struct ScrubWorker {
    pub(crate) id: usize,
    pub(crate) inbox: Inbox<String>,
    pub(crate) scrubber: Scrubber,
}

impl ScrubWorker {
    pub(crate) async fn run(mut self) {
        while let Some(url) = self.inbox.next().await {
            match self.scrubber.scrub(&url).await {
                Ok(outcome) => {
                    info!(
                        "Indexed {} ({} links, {} subdirectories)",
                        *url, outcome.links, outcome.frontier
                    );
                    self.scrubber.stats.record(CrawlEvent::SiteScrubbed {
                        worker_id: self.id,
                        url: url.as_str().to_owned(),
                        links: outcome.links,
                    });
                }
                Err(e) => {
                    warn!("Failed to index {}: {}", *url, e);
                    self.scrubber.stats.record(CrawlEvent::ScrubFailed {
                        worker_id: self.id,
                        url: url.as_str().to_owned(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!("Scrub worker {} exiting", self.id);
    }
}

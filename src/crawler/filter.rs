//! Link Filter pool
//!
//! Filters are regular expressions matched from the start of the URL: a
//! pattern only needs to match a prefix, never the whole string.

use super::pool::Inbox;
use super::queue::WorkQueue;
use crate::output::{CrawlEvent, StatSink};
use crate::ConfigError;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Compiled set of anchored prefix patterns
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    patterns: Vec<Regex>,
}

impl LinkFilter {
    /// Compiles patterns; an empty list accepts every URL
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("^(?:{})", p))
                    .map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns true if the URL should be fetched
    pub fn accepts(&self, url: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(url))
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

/// One Link Filter worker
pub(crate) struct FilterWorker {
    pub(crate) id: usize,
    pub(crate) inbox: Inbox<String>,
    pub(crate) fetch_queue: Arc<WorkQueue<String>>,
    pub(crate) filter: Arc<LinkFilter>,
    pub(crate) stats: Arc<StatSink>,
}

impl FilterWorker {
    pub(crate) async fn run(mut self) {
        while let Some(url) = self.inbox.next().await {
            if self.filter.accepts(&url) {
                self.fetch_queue.push(url.as_str().to_owned());
                self.stats.record(CrawlEvent::LinkMatched {
                    url: url.as_str().to_owned(),
                });
            } else {
                debug!("No pattern matched {}", *url);
            }
        }
        info!("Filter worker {} exiting", self.id);
    }
}

use crate::crawler::FetchResult;

/// Progress events emitted by the worker pools
///
/// Every event is counted by the [`StatSink`](super::StatSink) and then
/// broadcast to any dashboard or logger that subscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    /// A frontier URL was retrieved and its links extracted
    SiteScrubbed { worker_id: usize, url: String, links: usize },

    /// A resource link was pushed onto the Link Queue
    LinkDiscovered { url: String },

    /// A link passed the filter and was pushed onto the Fetch Queue
    LinkMatched { url: String },

    /// A fetch queue item completed, either downloaded or already current
    Fetched(FetchResult),

    /// Retrieving or walking a frontier URL failed; the item is dropped
    ScrubFailed { worker_id: usize, url: String, error: String },

    /// A download failed; the item is dropped
    FetchFailed { worker_id: usize, url: String, error: String },
}

impl CrawlEvent {
    /// One-line description for the recent-activity list, if the event deserves one
    pub fn activity_line(&self) -> Option<String> {
        match self {
            CrawlEvent::Fetched(result) if result.was_already_current => Some(format!(
                "have  {}",
                result.local_path.display()
            )),
            CrawlEvent::Fetched(result) => Some(format!(
                "saved {} ({})",
                result.local_path.display(),
                super::humanize_bytes(result.byte_size)
            )),
            CrawlEvent::ScrubFailed { url, error, .. } => {
                Some(format!("index failed {}: {}", url, error))
            }
            CrawlEvent::FetchFailed { url, error, .. } => {
                Some(format!("fetch failed {}: {}", url, error))
            }
            _ => None,
        }
    }
}

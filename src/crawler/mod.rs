//! Crawler module: the crawl-filter-fetch pipeline
//!
//! This module contains the core mirroring logic, including:
//! - Work queues with outstanding-item tracking
//! - The one-shot shutdown signal
//! - Anchor extraction and routing
//! - Scrubber, Filter and Fetcher worker pools
//! - Pipeline driving and completion detection

mod coordinator;
mod fetcher;
mod filter;
mod parser;
mod pool;
mod queue;
mod scrubber;
mod shutdown;

pub use coordinator::{Pipeline, PipelineReport};
pub use fetcher::{FetchResult, Fetcher};
pub use filter::LinkFilter;
pub use parser::{extract_links, route, ExtractedLink, Route};
pub use pool::PoolSettings;
pub use queue::{Claim, WorkQueue};
pub use scrubber::{Frontier, ScrubOutcome, Scrubber};
pub use shutdown::{CoordinatorState, ShutdownReason, ShutdownSignal};

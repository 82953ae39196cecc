//! Output module for crawl progress and reports
//!
//! This module handles:
//! - The event stream emitted by the worker pools
//! - Aggregating events into statistics
//! - Printing the final statistics report

mod events;
pub mod stats;

pub use events::CrawlEvent;
pub use stats::{humanize_bytes, print_statistics, StatSink, StatsSnapshot, RECENT_LINES};

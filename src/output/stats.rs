//! Crawl statistics
//!
//! The [`StatSink`] is the single aggregation point for worker events.
//! Counters are atomic and additive, so concurrent workers never lose an
//! update; the recent-activity list sits behind a mutex.

use super::CrawlEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::broadcast;

/// Number of recent activity lines retained
pub const RECENT_LINES: usize = 20;

/// Capacity of the event broadcast channel; slow subscribers see `Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Aggregates worker events into counters and rebroadcasts them
#[derive(Debug)]
pub struct StatSink {
    started_at: DateTime<Utc>,
    started: Instant,
    sites: AtomicU64,
    links: AtomicU64,
    matches: AtomicU64,
    fetched: AtomicU64,
    have: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
    recent: Mutex<VecDeque<String>>,
    events: broadcast::Sender<CrawlEvent>,
}

impl Default for StatSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            sites: AtomicU64::new(0),
            links: AtomicU64::new(0),
            matches: AtomicU64::new(0),
            fetched: AtomicU64::new(0),
            have: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_LINES)),
            events,
        }
    }

    /// Subscribes to the live event stream
    ///
    /// Only events recorded after the call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    /// Counts an event and forwards it to subscribers
    pub fn record(&self, event: CrawlEvent) {
        match &event {
            CrawlEvent::SiteScrubbed { .. } => {
                self.sites.fetch_add(1, Ordering::Relaxed);
            }
            CrawlEvent::LinkDiscovered { .. } => {
                self.links.fetch_add(1, Ordering::Relaxed);
            }
            CrawlEvent::LinkMatched { .. } => {
                self.matches.fetch_add(1, Ordering::Relaxed);
            }
            CrawlEvent::Fetched(result) => {
                if result.was_already_current {
                    self.have.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.fetched.fetch_add(1, Ordering::Relaxed);
                }
                self.bytes.fetch_add(result.byte_size, Ordering::Relaxed);
            }
            CrawlEvent::ScrubFailed { .. } | CrawlEvent::FetchFailed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(line) = event.activity_line() {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if recent.len() == RECENT_LINES {
                recent.pop_front();
            }
            recent.push_back(line);
        }

        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let recent_lines = self
            .recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();

        StatsSnapshot {
            started_at: self.started_at,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            sites: self.sites.load(Ordering::Relaxed),
            links: self.links.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            have: self.have.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            recent_lines,
        }
    }
}

/// Serializable view of the stat sink
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Frontier URLs scrubbed
    pub sites: u64,
    /// Resource links discovered
    pub links: u64,
    /// Links that passed the filter
    pub matches: u64,
    /// Files downloaded
    pub fetched: u64,
    /// Files skipped as already current
    pub have: u64,
    /// Scrub and fetch failures
    pub failed: u64,
    /// Total size of every completed file, downloaded or current
    pub bytes: u64,
    pub recent_lines: Vec<String>,
}

impl StatsSnapshot {
    /// Compact one-line summary used for progress logging and the status display
    pub fn summary_line(&self) -> String {
        format!(
            "sites={} links={} matches={} fetched={} have={} failed={} size={}",
            self.sites,
            self.links,
            self.matches,
            self.fetched,
            self.have,
            self.failed,
            humanize_bytes(self.bytes)
        )
    }
}

/// Formats a byte count with binary units
///
/// # Examples
///
/// ```
/// use sumi_mirror::output::humanize_bytes;
///
/// assert_eq!(humanize_bytes(512), "512 B");
/// assert_eq!(humanize_bytes(1536), "1.5 KiB");
/// ```
pub fn humanize_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StatsSnapshot) {
    println!("=== Mirror Statistics ===\n");

    println!("Overview:");
    println!("  Started: {}", stats.started_at.to_rfc3339());
    println!("  Elapsed: {:.1}s", stats.elapsed_secs);
    println!();

    println!("Discovery:");
    println!("  Sites indexed: {}", stats.sites);
    println!("  Links found / matched: {} / {}", stats.links, stats.matches);
    println!();

    println!("Transfers:");
    println!("  Downloaded: {}", stats.fetched);
    println!("  Already current: {}", stats.have);
    println!("  Failed: {}", stats.failed);
    println!("  Total size: {}", humanize_bytes(stats.bytes));

    let completed = stats.fetched + stats.have;
    if completed > 0 && stats.elapsed_secs > 0.0 {
        println!(
            "  Throughput: {}/s",
            humanize_bytes((stats.bytes as f64 / stats.elapsed_secs) as u64)
        );
    }
    println!();

    if !stats.recent_lines.is_empty() {
        println!("Recent Activity:");
        for line in &stats.recent_lines {
            println!("  {}", line);
        }
        println!();
    }
}

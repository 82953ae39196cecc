//! Pipeline driver - worker pool orchestration and completion detection
//!
//! This module wires the three queues and the three worker pools together:
//! - Seeding the Frontier Queue
//! - Spawning Scrubber, Filter and Fetcher workers
//! - Polling queue counters to detect a drained pipeline
//! - Periodic progress logging
//! - Waiting for every worker to observe the shutdown signal

use super::fetcher::{FetchWorker, Fetcher};
use super::filter::{FilterWorker, LinkFilter};
use super::pool::{Inbox, PoolSettings};
use super::queue::WorkQueue;
use super::scrubber::{Frontier, ScrubWorker, Scrubber};
use super::shutdown::{ShutdownReason, ShutdownSignal};
use crate::config::{validate, validate_seed, Config};
use crate::normalize_url;
use crate::output::{StatSink, StatsSnapshot};
use crate::transport::Transport;
use crate::MirrorError;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};

/// Final report returned by [`Pipeline::run`]
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Why the pipeline stopped
    pub reason: ShutdownReason,
    /// Counters at the moment every worker had exited
    pub stats: StatsSnapshot,
    /// Items still queued or in flight when the workers stopped (zero after a drain)
    pub abandoned: usize,
}

impl PipelineReport {
    /// True if the pipeline stopped because all work was done
    pub fn drained(&self) -> bool {
        self.reason == ShutdownReason::Drained
    }
}

/// The three queues, owned by the pipeline and shared with each worker
struct Queues {
    frontier: Arc<Frontier>,
    links: Arc<WorkQueue<String>>,
    fetch: Arc<WorkQueue<String>>,
}

impl Queues {
    /// Reads outstanding counts upstream to downstream
    ///
    /// Each producer pushes its output before its own item is marked done,
    /// so once an upstream queue reads zero it cannot become non-zero again.
    /// Three zero reads in this order therefore mean nothing is left anywhere.
    fn drained(&self) -> bool {
        self.frontier.queue().outstanding() == 0
            && self.links.outstanding() == 0
            && self.fetch.outstanding() == 0
    }

    fn outstanding(&self) -> usize {
        self.frontier.queue().outstanding() + self.links.outstanding() + self.fetch.outstanding()
    }
}

/// A configured mirror run
///
/// # Example
///
/// ```no_run
/// use sumi_mirror::{Config, Pipeline};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = Pipeline::new(Config::default())?;
/// let report = pipeline.run(&["http://example.test/docs/".to_string()]).await?;
/// println!("stopped: {}", report.reason);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: Config,
    transport: Transport,
    filter: Arc<LinkFilter>,
    stats: Arc<StatSink>,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    /// Validates the configuration and builds the shared transport
    ///
    /// # Errors
    ///
    /// * [`MirrorError::Config`] - Invalid configuration or filter pattern
    /// * [`MirrorError::Pipeline`] - The HTTP client could not be built
    pub fn new(config: Config) -> Result<Self, MirrorError> {
        validate(&config)?;
        let filter = LinkFilter::new(&config.filter.patterns)?;
        let transport = Transport::new(&config.transport)
            .map_err(|e| MirrorError::Pipeline(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            transport,
            filter: Arc::new(filter),
            stats: Arc::new(StatSink::new()),
            shutdown: ShutdownSignal::new(),
        })
    }

    /// The stat sink workers report into
    pub fn stats(&self) -> Arc<StatSink> {
        Arc::clone(&self.stats)
    }

    /// A handle for raising shutdown from outside (timeouts, Ctrl-C)
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    fn pool_settings(&self) -> PoolSettings {
        let crawler = &self.config.crawler;
        PoolSettings {
            poll_interval: Duration::from_millis(crawler.poll_interval_ms),
            idle_timeout: (crawler.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(crawler.idle_timeout_secs)),
        }
    }

    /// Runs the pipeline until it drains or the shutdown signal is raised
    ///
    /// 1. Validate and normalize the seed URLs
    /// 2. Seed the Frontier Queue
    /// 3. Spawn every worker pool
    /// 4. Poll for a drained pipeline, logging progress
    /// 5. Wait for every worker to exit
    ///
    /// Per-item failures never surface here; they are logged and counted.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Config`] if no seeds were given or a seed is invalid.
    pub async fn run(self, seeds: &[String]) -> Result<PipelineReport, MirrorError> {
        if seeds.is_empty() {
            return Err(MirrorError::Config(crate::ConfigError::Validation(
                "at least one seed URL is required".to_string(),
            )));
        }
        let seeds = seeds
            .iter()
            .map(|seed| validate_seed(seed).map(|url| normalize_url(url.as_str())))
            .collect::<Result<Vec<_>, _>>()?;

        let crawler = &self.config.crawler;
        let queues = Queues {
            frontier: Arc::new(Frontier::new(
                Arc::new(WorkQueue::new("frontier")),
                crawler.dedupe_frontier,
            )),
            links: Arc::new(WorkQueue::new("links")),
            fetch: Arc::new(WorkQueue::new("fetch")),
        };

        for seed in seeds {
            info!("Seeding {}", seed);
            queues.frontier.push(seed);
        }

        let workers = self.spawn_workers(&queues);
        info!(
            "Started {} scrubbers, {} filters, {} fetchers",
            crawler.scrubbers, crawler.filters, crawler.fetchers
        );
        match self.filter.pattern_count() {
            0 => info!("No patterns, every link is fetched"),
            n => info!("Fetching links matching any of {} patterns", n),
        }

        self.drive(&queues).await;

        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        let reason = self.shutdown.reason().unwrap_or(ShutdownReason::Drained);
        let stats = self.stats.snapshot();
        info!("Pipeline stopped: {} ({})", reason, stats.summary_line());

        Ok(PipelineReport {
            reason,
            stats,
            abandoned: queues.outstanding(),
        })
    }

    fn spawn_workers(&self, queues: &Queues) -> Vec<JoinHandle<()>> {
        let crawler = &self.config.crawler;
        let settings = self.pool_settings();
        let mut handles = Vec::with_capacity(crawler.scrubbers + crawler.filters + crawler.fetchers);

        let scrubber = Scrubber::new(
            Arc::clone(&queues.frontier),
            Arc::clone(&queues.links),
            self.transport.clone(),
            Arc::clone(&self.stats),
            crawler.recursive,
        );
        for id in 0..crawler.scrubbers {
            let worker = ScrubWorker {
                id,
                inbox: Inbox::new(
                    "scrubber",
                    Arc::clone(queues.frontier.queue()),
                    self.shutdown.clone(),
                    settings,
                ),
                scrubber: scrubber.clone(),
            };
            handles.push(tokio::spawn(
                worker.run().instrument(info_span!("scrubber", worker = id)),
            ));
        }

        for id in 0..crawler.filters {
            let worker = FilterWorker {
                id,
                inbox: Inbox::new(
                    "filter",
                    Arc::clone(&queues.links),
                    self.shutdown.clone(),
                    settings,
                ),
                fetch_queue: Arc::clone(&queues.fetch),
                filter: Arc::clone(&self.filter),
                stats: Arc::clone(&self.stats),
            };
            handles.push(tokio::spawn(
                worker.run().instrument(info_span!("filter", worker = id)),
            ));
        }

        let fetcher = Fetcher::new(&self.config.output, self.transport.clone());
        for id in 0..crawler.fetchers {
            let worker = FetchWorker {
                id,
                inbox: Inbox::new(
                    "fetcher",
                    Arc::clone(&queues.fetch),
                    self.shutdown.clone(),
                    settings,
                ),
                fetcher: fetcher.clone(),
                stats: Arc::clone(&self.stats),
            };
            handles.push(tokio::spawn(
                worker.run().instrument(info_span!("fetcher", worker = id)),
            ));
        }

        handles
    }

    /// Polls for completion until the shutdown signal is raised
    async fn drive(&self, queues: &Queues) {
        let crawler = &self.config.crawler;
        let mut ticker = tokio::time::interval(Duration::from_millis(crawler.poll_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let progress_every = Duration::from_secs(crawler.progress_interval_secs);
        let mut last_progress = Instant::now();

        loop {
            tokio::select! {
                reason = self.shutdown.wait() => {
                    info!("Shutdown raised: {}", reason);
                    return;
                }
                _ = ticker.tick() => {
                    if queues.drained() {
                        if self.shutdown.raise(ShutdownReason::Drained) {
                            info!("All queues drained");
                        }
                        return;
                    }

                    if !progress_every.is_zero() && last_progress.elapsed() >= progress_every {
                        last_progress = Instant::now();
                        info!(
                            "Progress: {} | queued frontier={} links={} fetch={}",
                            self.stats.snapshot().summary_line(),
                            queues.frontier.queue().len(),
                            queues.links.len(),
                            queues.fetch.len()
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.output.root = root.to_string_lossy().into_owned();
        config.crawler.poll_interval_ms = 10;
        config.crawler.progress_interval_secs = 0;
        config
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = Config::default();
        config.filter.patterns = vec!["(".to_string()];
        assert!(matches!(
            Pipeline::new(config),
            Err(MirrorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_no_seeds_rejected() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        assert!(pipeline.run(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_seed_rejected() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let result = pipeline.run(&["mailto:someone@example.test".to_string()]).await;
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[tokio::test]
    async fn test_drains_after_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nothing here</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(dir.path())).unwrap();
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            pipeline.run(&[format!("{}/empty/", server.uri())]),
        )
        .await
        .expect("pipeline did not drain")
        .unwrap();

        assert!(report.drained());
        assert_eq!(report.abandoned, 0);
        assert_eq!(report.stats.sites, 1);
    }

    #[tokio::test]
    async fn test_external_shutdown_stops_workers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(dir.path())).unwrap();
        let signal = pipeline.shutdown_signal();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            signal.raise(ShutdownReason::Timeout);
        });

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            pipeline.run(&[format!("{}/slow/", server.uri())]),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.reason, ShutdownReason::Timeout);
    }
}

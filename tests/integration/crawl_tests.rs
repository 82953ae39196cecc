//! Integration tests for the mirroring pipeline
//!
//! These tests use wiremock to serve directory index pages and files, and
//! run the full scrub-filter-fetch cycle into a temporary mirror root.

use std::path::Path;
use std::time::Duration;
use sumi_mirror::config::Config;
use sumi_mirror::{CrawlEvent, Pipeline, PipelineReport, ShutdownReason};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration mirroring into `root`
fn create_test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.output.root = root.to_string_lossy().into_owned();
    config.crawler.poll_interval_ms = 20;
    config
}

fn listing(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">{}</a>\n", href, href))
        .collect();
    format!("<html><body><h1>Index</h1>\n{}</body></html>", anchors)
}

async fn mount_page(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

async fn run_pipeline(config: Config, seeds: Vec<String>) -> PipelineReport {
    let pipeline = Pipeline::new(config).expect("Failed to build pipeline");
    tokio::time::timeout(Duration::from_secs(15), pipeline.run(&seeds))
        .await
        .expect("Pipeline did not finish in time")
        .expect("Pipeline failed")
}

#[tokio::test]
async fn test_mirror_single_directory() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    mount_page(&server, "/docs/", listing(&["file.txt"])).await;
    Mock::given(method("GET"))
        .and(path("/docs/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let report = run_pipeline(
        create_test_config(root.path()),
        vec![format!("{}/docs/", server.uri())],
    )
    .await;

    assert_eq!(report.reason, ShutdownReason::Drained);
    assert!(report.drained());
    assert_eq!(report.stats.sites, 1);
    assert_eq!(report.stats.links, 1);
    assert_eq!(report.stats.matches, 1);
    assert_eq!(report.stats.fetched, 1);
    assert_eq!(report.stats.have, 0);
    assert_eq!(report.stats.bytes, 5);

    let saved = root.path().join("127.0.0.1/docs/file.txt");
    assert_eq!(std::fs::read_to_string(saved).unwrap(), "hello");
}

#[tokio::test]
async fn test_rerun_skips_current_files() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    let local = root.path().join("127.0.0.1/docs/file.txt");
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, "hello").unwrap();

    mount_page(&server, "/docs/", listing(&["file.txt"])).await;
    Mock::given(method("HEAD"))
        .and(path("/docs/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(create_test_config(root.path())).unwrap();
    let mut events = pipeline.stats().subscribe();
    let report = tokio::time::timeout(
        Duration::from_secs(15),
        pipeline.run(&[format!("{}/docs/", server.uri())]),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.stats.have, 1);
    assert_eq!(report.stats.fetched, 0);
    assert_eq!(report.stats.bytes, 5);

    let mut results = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CrawlEvent::Fetched(result) = event {
            results.push(result);
        }
    }
    assert_eq!(results.len(), 1);
    assert!(results[0].was_already_current);
    assert_eq!(results[0].local_path, local);
    assert_eq!(results[0].byte_size, 5);
}

#[tokio::test]
async fn test_size_mismatch_refetches() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    let local = root.path().join("127.0.0.1/docs/file.txt");
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, "old").unwrap();

    mount_page(&server, "/docs/", listing(&["file.txt"])).await;
    Mock::given(method("HEAD"))
        .and(path("/docs/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("updated"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("updated"))
        .expect(1)
        .mount(&server)
        .await;

    let report = run_pipeline(
        create_test_config(root.path()),
        vec![format!("{}/docs/", server.uri())],
    )
    .await;

    assert_eq!(report.stats.fetched, 1);
    assert_eq!(std::fs::read_to_string(local).unwrap(), "updated");
}

#[tokio::test]
async fn test_patterns_limit_fetches() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    mount_page(&server, "/pub/", listing(&["notes.txt", "image.iso"])).await;
    Mock::given(method("GET"))
        .and(path("/pub/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("notes"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pub/image.iso"))
        .respond_with(ResponseTemplate::new(200).set_body_string("iso"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(root.path());
    config.filter.patterns = vec![format!(
        "{}/pub/[^/]*\\.txt$",
        regex::escape(&server.uri())
    )];

    let report = run_pipeline(config, vec![format!("{}/pub/", server.uri())]).await;

    assert_eq!(report.stats.links, 2);
    assert_eq!(report.stats.matches, 1);
    assert_eq!(report.stats.fetched, 1);
    assert!(root.path().join("127.0.0.1/pub/notes.txt").exists());
    assert!(!root.path().join("127.0.0.1/pub/image.iso").exists());
}

#[tokio::test]
async fn test_recursive_cycle_terminates() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    mount_page(&server, "/pub/", listing(&["sub/", "top.txt"])).await;
    Mock::given(method("GET"))
        .and(path("/pub/sub/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing(&["../sub/", "deep.txt"]))
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    for file in ["/pub/top.txt", "/pub/sub/deep.txt"] {
        Mock::given(method("GET"))
            .and(path(file))
            .respond_with(ResponseTemplate::new(200).set_body_string("data"))
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(root.path());
    config.crawler.recursive = true;

    let report = run_pipeline(config, vec![format!("{}/pub/", server.uri())]).await;

    assert_eq!(report.reason, ShutdownReason::Drained);
    assert_eq!(report.stats.sites, 2);
    assert_eq!(report.stats.fetched, 2);
    assert!(root.path().join("127.0.0.1/pub/top.txt").exists());
    assert!(root.path().join("127.0.0.1/pub/sub/deep.txt").exists());
}

#[tokio::test]
async fn test_non_recursive_directory_saved_as_index() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    mount_page(&server, "/pub/", listing(&["sub/"])).await;
    Mock::given(method("GET"))
        .and(path("/pub/sub/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>sub</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let report = run_pipeline(
        create_test_config(root.path()),
        vec![format!("{}/pub/", server.uri())],
    )
    .await;

    assert_eq!(report.stats.sites, 1);
    assert_eq!(report.stats.fetched, 1);
    let index = root.path().join("127.0.0.1/pub/sub/index.html");
    assert_eq!(std::fs::read_to_string(index).unwrap(), "<html>sub</html>");
}

#[tokio::test]
async fn test_trim_lead_strips_host() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    mount_page(&server, "/docs/", listing(&["file.txt"])).await;
    Mock::given(method("GET"))
        .and(path("/docs/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let mut config = create_test_config(root.path());
    config.output.trim_lead = 1;

    run_pipeline(config, vec![format!("{}/docs/", server.uri())]).await;

    assert!(root.path().join("docs/file.txt").exists());
    assert!(!root.path().join("127.0.0.1").exists());
}

#[tokio::test]
async fn test_failures_do_not_stop_the_run() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    mount_page(&server, "/docs/", listing(&["missing.txt", "ok.txt"])).await;
    Mock::given(method("GET"))
        .and(path("/docs/ok.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let report = run_pipeline(
        create_test_config(root.path()),
        vec![
            format!("{}/docs/", server.uri()),
            format!("{}/nothing-here/", server.uri()),
        ],
    )
    .await;

    assert_eq!(report.reason, ShutdownReason::Drained);
    assert_eq!(report.stats.fetched, 1);
    // one index failure and one fetch failure
    assert_eq!(report.stats.failed, 2);
    assert!(!root.path().join("127.0.0.1/docs/missing.txt").exists());
}

#[tokio::test]
async fn test_external_timeout_stops_pipeline() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/slow/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing(&["a.txt"]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(create_test_config(root.path())).unwrap();
    let signal = pipeline.shutdown_signal();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        signal.raise(ShutdownReason::Timeout);
    });

    let report = tokio::time::timeout(
        Duration::from_secs(15),
        pipeline.run(&[format!("{}/slow/", server.uri())]),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.reason, ShutdownReason::Timeout);
    assert!(!report.drained());
}

#[tokio::test]
async fn test_redirected_seed_mirrors_real_directory() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/docs"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/docs/", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/docs/", listing(&["file.txt"])).await;
    Mock::given(method("GET"))
        .and(path("/docs/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let report = run_pipeline(
        create_test_config(root.path()),
        vec![format!("{}/docs", server.uri())],
    )
    .await;

    assert_eq!(report.stats.fetched, 1);
    assert!(root.path().join("127.0.0.1/docs/file.txt").exists());
}

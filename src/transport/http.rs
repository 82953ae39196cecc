//! HTTP(S) transport
//!
//! This module handles all HTTP requests for the mirror, including:
//! - Building HTTP clients with the configured user agent and proxy
//! - GET requests for index pages (as text)
//! - HEAD requests to read the remote `Content-Length`
//! - Streaming GET downloads into a freshly truncated local file

use crate::config::TransportConfig;
use crate::{TransportError, TransportResult};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Proxy, Response};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Proxies come from `config.proxy` when set; otherwise reqwest picks up the
/// `HTTP_PROXY`/`HTTPS_PROXY` environment variables.
///
/// # Example
///
/// ```no_run
/// use sumi_mirror::config::TransportConfig;
/// use sumi_mirror::transport::build_http_client;
///
/// let client = build_http_client(&TransportConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &TransportConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        // Content-Length comparisons need the identity encoding on the wire
        .gzip(false)
        .brotli(false);

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }

    builder.build()
}

/// Maps a reqwest error for `url` into a transport error
fn http_error(url: &str, source: reqwest::Error) -> TransportError {
    TransportError::Http {
        url: url.to_string(),
        source,
    }
}

/// Rejects non-success responses without reading their body
fn check_status(url: &str, response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// An index page body and the URL it was finally served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Location after redirects; relative anchors resolve against this
    pub url: Url,
    pub body: String,
}

/// Fetches a page body as text, following redirects
pub async fn http_get_text(client: &Client, url: &str) -> TransportResult<Page> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| http_error(url, e))?;
    let response = check_status(url, response)?;
    let final_url = response.url().clone();
    if final_url.as_str() != url {
        debug!("{} redirected to {}", url, final_url);
    }
    let body = response.text().await.map_err(|e| http_error(url, e))?;
    Ok(Page {
        url: final_url,
        body,
    })
}

/// Sends a HEAD request and returns the advertised `Content-Length`
///
/// The header is read directly: a HEAD response has no body, so the body
/// size hint cannot be used.
///
/// # Returns
///
/// * `Ok(Some(len))` - The server advertised a length
/// * `Ok(None)` - No usable `Content-Length`, or the server refused HEAD
/// * `Err(TransportError)` - Network failure
pub async fn http_head_length(client: &Client, url: &str) -> TransportResult<Option<u64>> {
    let response = client
        .head(url)
        .send()
        .await
        .map_err(|e| http_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        // Plenty of servers answer HEAD with 403/405 but serve GET fine
        debug!("HEAD {} returned {}, size unknown", url, status);
        return Ok(None);
    }

    Ok(response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok()))
}

/// Downloads `url` into `dest`, truncating any existing file
///
/// The destination is only opened once the server has answered with a
/// success status, so a failed request never clobbers an existing copy.
///
/// # Returns
///
/// The number of bytes written.
pub async fn http_download(client: &Client, url: &str, dest: &Path) -> TransportResult<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| http_error(url, e))?;
    let mut response = check_status(url, response)?;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = response.chunk().await.map_err(|e| http_error(url, e))? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&TransportConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let config = TransportConfig {
            proxy: Some("http://127.0.0.1:3128".to_string()),
            ..TransportConfig::default()
        };
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_get_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a href=\"x\">x</a>"))
            .mount(&server)
            .await;

        let client = build_http_client(&TransportConfig::default()).unwrap();
        let page = http_get_text(&client, &format!("{}/index.html", server.uri()))
            .await
            .unwrap();
        assert!(page.body.contains("href"));
        assert_eq!(page.url.path(), "/index.html");
    }

    #[tokio::test]
    async fn test_get_text_reports_redirect_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", format!("{}/docs/", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("listing"))
            .mount(&server)
            .await;

        let client = build_http_client(&TransportConfig::default()).unwrap();
        let page = http_get_text(&client, &format!("{}/docs", server.uri()))
            .await
            .unwrap();

        assert_eq!(page.url.as_str(), format!("{}/docs/", server.uri()));
        assert_eq!(page.body, "listing");
    }

    #[tokio::test]
    async fn test_get_text_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_http_client(&TransportConfig::default()).unwrap();
        let result = http_get_text(&client, &format!("{}/missing", server.uri())).await;
        assert!(matches!(
            result,
            Err(TransportError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_head_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-length", "1234"))
            .mount(&server)
            .await;

        let client = build_http_client(&TransportConfig::default()).unwrap();
        let length = http_head_length(&client, &format!("{}/file.bin", server.uri()))
            .await
            .unwrap();
        assert_eq!(length, Some(1234));
    }

    #[tokio::test]
    async fn test_head_refused_means_unknown_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;

        let client = build_http_client(&TransportConfig::default()).unwrap();
        let length = http_head_length(&client, &format!("{}/file.bin", server.uri()))
            .await
            .unwrap();
        assert_eq!(length, None);
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello mirror"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.txt");
        std::fs::write(&dest, "stale content that is longer").unwrap();

        let client = build_http_client(&TransportConfig::default()).unwrap();
        let written = http_download(&client, &format!("{}/file.txt", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 12);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello mirror");
    }

    #[tokio::test]
    async fn test_download_error_keeps_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("keep.txt");
        std::fs::write(&dest, "keep me").unwrap();

        let client = build_http_client(&TransportConfig::default()).unwrap();
        let result = http_download(&client, &format!("{}/keep.txt", server.uri()), &dest).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "keep me");
    }
}

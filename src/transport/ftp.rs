//! Anonymous FTP transport
//!
//! suppaftp's synchronous client runs on tokio's blocking pool; the async
//! wrappers at the bottom of this file are what the pipeline calls.

use crate::{normalize_url, TransportError, TransportResult, UrlError};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, FtpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Login used for every FTP session
pub const ANONYMOUS_USER: &str = "anonymous";
pub const ANONYMOUS_PASSWORD: &str = "anonymous@";

const DEFAULT_FTP_PORT: u16 = 21;

/// Directories deeper than this below the seed are not entered
const MAX_WALK_DEPTH: usize = 64;

/// File URLs buffered between the walker and the scrubber
const LISTING_BUFFER: usize = 256;

/// Connection details and decoded path of an `ftp://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl FtpTarget {
    /// Parses an `ftp://` URL
    ///
    /// An empty path becomes `/`.
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;
        if parsed.scheme() != "ftp" {
            return Err(UrlError::InvalidScheme(parsed.scheme().to_string()));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| UrlError::MissingHost(url.to_string()))?
            .to_string();
        let port = parsed.port().unwrap_or(DEFAULT_FTP_PORT);

        let raw_path = parsed.path();
        let path = urlencoding::decode(raw_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());
        let path = if path.is_empty() { "/".to_string() } else { path };

        Ok(Self { host, port, path })
    }

    /// `host` or `host:port` as it appears in URLs built from this target
    fn authority(&self) -> String {
        if self.port == DEFAULT_FTP_PORT {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Builds the URL of `name` inside remote directory `dir`
    ///
    /// Each path segment is percent-encoded, so names containing `#`, `?`
    /// or `%` round-trip through [`FtpTarget::parse`] unchanged.
    fn file_url(&self, dir: &str, name: &str) -> Result<String, UrlError> {
        let base = format!("ftp://{}/", self.authority());
        let mut url = Url::parse(&base).map_err(|e| UrlError::Parse(format!("{}: {}", base, e)))?;

        let full = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("{}/{}", dir, name)
        };
        url.path_segments_mut()
            .map_err(|_| UrlError::Malformed(base.clone()))?
            .clear()
            .extend(full.split('/').filter(|segment| !segment.is_empty()));

        Ok(normalize_url(url.as_str()))
    }
}

fn ftp_error(url: &str, source: FtpError) -> TransportError {
    TransportError::Ftp {
        url: url.to_string(),
        source,
    }
}

/// Opens an anonymous binary-mode session
fn connect(target: &FtpTarget, timeout: Duration) -> FtpResult<FtpStream> {
    let mut ftp = FtpStream::connect((target.host.as_str(), target.port))?;
    ftp.get_ref()
        .set_read_timeout(Some(timeout))
        .map_err(FtpError::ConnectionError)?;
    ftp.login(ANONYMOUS_USER, ANONYMOUS_PASSWORD)?;
    ftp.transfer_type(FileType::Binary)?;
    Ok(ftp)
}

/// Ends a session; failures here never affect the transfer result
fn disconnect(mut ftp: FtpStream) {
    if let Err(e) = ftp.quit() {
        debug!("FTP QUIT failed: {}", e);
    }
}

/// Recursive walker over an FTP tree
///
/// Every NLST entry is tried with CWD. Entries that can be entered are
/// descended into; everything else is reported as a file. Permission
/// problems therefore look like files, which matches how anonymous mirrors
/// are usually laid out.
pub struct FtpWalker {
    url: String,
    target: FtpTarget,
    timeout: Duration,
}

impl FtpWalker {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, UrlError> {
        Ok(Self {
            url: url.to_string(),
            target: FtpTarget::parse(url)?,
            timeout,
        })
    }

    /// Walks the tree below the seed URL, calling `on_file` with each file URL
    ///
    /// If the seed itself cannot be entered it is reported as a single file.
    ///
    /// # Returns
    ///
    /// The number of files reported.
    pub fn walk<F>(&self, mut on_file: F) -> TransportResult<usize>
    where
        F: FnMut(String),
    {
        let mut ftp = connect(&self.target, self.timeout).map_err(|e| ftp_error(&self.url, e))?;

        let result = match ftp.cwd(&self.target.path) {
            Ok(()) => self.walk_dir(&mut ftp, 0, &mut on_file),
            Err(e) => {
                debug!("{} is not a directory ({}), treating as file", self.url, e);
                on_file(normalize_url(&self.url));
                Ok(1)
            }
        };

        disconnect(ftp);
        result.map_err(|e| ftp_error(&self.url, e))
    }

    fn walk_dir<F>(&self, ftp: &mut FtpStream, depth: usize, on_file: &mut F) -> FtpResult<usize>
    where
        F: FnMut(String),
    {
        let dir = ftp.pwd()?;
        let entries = match ftp.nlst(None) {
            Ok(entries) => entries,
            // Many servers answer NLST on an empty directory with 550
            Err(FtpError::UnexpectedResponse(response)) => {
                debug!("NLST in {} returned {:?}, treating as empty", dir, response);
                return Ok(0);
            }
            Err(e) if depth > 0 => {
                warn!("Skipping {}: listing failed: {}", dir, e);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let mut files = 0;
        for entry in entries {
            let name = entry.trim();
            if matches!(name, "" | "." | "..") {
                continue;
            }

            match ftp.cwd(name) {
                Ok(()) => {
                    if depth + 1 >= MAX_WALK_DEPTH {
                        warn!("Not descending below {}/{}: depth limit reached", dir, name);
                    } else {
                        files += self.walk_dir(ftp, depth + 1, on_file)?;
                    }
                    ftp.cwd(&dir)?;
                }
                Err(e) => {
                    if !matches!(e, FtpError::UnexpectedResponse(_)) {
                        warn!("CWD {} in {} failed: {}", name, dir, e);
                    }
                    match self.target.file_url(&dir, name) {
                        Ok(url) => {
                            on_file(url);
                            files += 1;
                        }
                        Err(e) => warn!("Skipping entry {} in {}: {}", name, dir, e),
                    }
                }
            }
        }

        Ok(files)
    }
}

/// Asks the server for the size of a file
///
/// # Returns
///
/// * `Ok(Some(size))` - SIZE succeeded
/// * `Ok(None)` - The server refused SIZE for this path
/// * `Err(TransportError)` - Connection-level failure
pub fn ftp_size(url: &str, timeout: Duration) -> TransportResult<Option<u64>> {
    let target = FtpTarget::parse(url)?;
    let mut ftp = connect(&target, timeout).map_err(|e| ftp_error(url, e))?;

    let result = match ftp.size(&target.path) {
        Ok(size) => Ok(Some(size as u64)),
        Err(FtpError::UnexpectedResponse(response)) => {
            debug!("SIZE refused for {}: {:?}", url, response);
            Ok(None)
        }
        Err(e) => Err(ftp_error(url, e)),
    };

    disconnect(ftp);
    result
}

/// Retrieves a file into `dest`, truncating any existing file
///
/// Local write failures come back as [`TransportError::Io`] so callers can
/// tell them apart from network errors.
///
/// # Returns
///
/// The number of bytes written.
pub fn ftp_download(url: &str, dest: &Path, timeout: Duration) -> TransportResult<u64> {
    let target = FtpTarget::parse(url)?;
    let mut ftp = connect(&target, timeout).map_err(|e| ftp_error(url, e))?;

    let mut file = match std::fs::File::create(dest) {
        Ok(file) => file,
        Err(e) => {
            disconnect(ftp);
            return Err(TransportError::Io(e));
        }
    };

    let mut write_error: Option<io::Error> = None;
    let result = ftp.retr(&target.path, |reader: &mut dyn Read| {
        let mut buf = [0u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let n = reader.read(&mut buf).map_err(FtpError::ConnectionError)?;
            if n == 0 {
                break;
            }
            if let Err(e) = file.write_all(&buf[..n]) {
                let kind = e.kind();
                write_error = Some(e);
                return Err(FtpError::ConnectionError(io::Error::new(
                    kind,
                    "local write failed",
                )));
            }
            written += n as u64;
        }
        Ok(written)
    });

    disconnect(ftp);

    if let Some(e) = write_error {
        return Err(TransportError::Io(e));
    }
    let written = result.map_err(|e| ftp_error(url, e))?;
    file.flush()?;
    Ok(written)
}

fn join_error(e: tokio::task::JoinError) -> TransportError {
    TransportError::Join(e.to_string())
}

/// Files found so far by a walk running on the blocking pool
///
/// File URLs arrive through [`FtpListing::next`] as soon as the walker
/// reports them, so a walk that fails halfway still yields everything it
/// found before the failure.
pub struct FtpListing {
    files: mpsc::Receiver<String>,
    walk: JoinHandle<TransportResult<usize>>,
}

impl FtpListing {
    pub(crate) fn new(
        files: mpsc::Receiver<String>,
        walk: JoinHandle<TransportResult<usize>>,
    ) -> Self {
        Self { files, walk }
    }

    /// Next file URL, or `None` once the walk has stopped
    pub async fn next(&mut self) -> Option<String> {
        self.files.recv().await
    }

    /// Waits for the walk to end and returns its file count or error
    pub async fn finish(self) -> TransportResult<usize> {
        self.walk.await.map_err(join_error)?
    }
}

/// Starts walking an FTP tree on the blocking pool
///
/// # Errors
///
/// Returns [`TransportError::Url`] if `url` is not a usable `ftp://` URL.
/// Connection and listing failures are reported by [`FtpListing::finish`].
pub fn ftp_walk(url: &str, timeout: Duration) -> TransportResult<FtpListing> {
    let walker = FtpWalker::new(url, timeout)?;
    let (tx, files) = mpsc::channel(LISTING_BUFFER);

    let walk = tokio::task::spawn_blocking(move || {
        walker.walk(|file| {
            if tx.blocking_send(file).is_err() {
                debug!("FTP listing receiver dropped");
            }
        })
    });

    Ok(FtpListing::new(files, walk))
}

/// Async wrapper around [`ftp_size`]
pub async fn ftp_remote_size(url: &str, timeout: Duration) -> TransportResult<Option<u64>> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || ftp_size(&url, timeout))
        .await
        .map_err(join_error)?
}

/// Async wrapper around [`ftp_download`]
pub async fn ftp_fetch(url: &str, dest: PathBuf, timeout: Duration) -> TransportResult<u64> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || ftp_download(&url, &dest, timeout))
        .await
        .map_err(join_error)?
}

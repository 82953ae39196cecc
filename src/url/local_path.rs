use crate::UrlError;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use url::Url;

/// File name used when a directory URL reaches the fetcher
pub const DIRECTORY_INDEX_FILE: &str = "index.html";

/// Derives the local mirror path for a URL
///
/// The path is built from the URL host followed by its path segments, with
/// the first `trim_lead` components removed (the host counts as the first
/// component). Empty, `.` and `..` segments are dropped and percent-encoded
/// segments are decoded. A path ending in `/` maps to [`DIRECTORY_INDEX_FILE`]
/// inside that directory.
///
/// # Arguments
///
/// * `root` - Mirror root directory
/// * `url` - The URL being fetched
/// * `trim_lead` - Number of leading components to strip
///
/// # Errors
///
/// * [`UrlError::Parse`] - The URL cannot be parsed
/// * [`UrlError::MissingHost`] - The URL has no host
/// * [`UrlError::Malformed`] - Trimming leaves no components
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sumi_mirror::url::output_path;
///
/// let path = output_path(Path::new("."), "http://example.test/docs/file.txt", 0).unwrap();
/// assert_eq!(path, Path::new("./example.test/docs/file.txt"));
///
/// let path = output_path(Path::new("."), "http://example.test/docs/file.txt", 1).unwrap();
/// assert_eq!(path, Path::new("./docs/file.txt"));
/// ```
pub fn output_path(root: &Path, url: &str, trim_lead: usize) -> Result<PathBuf, UrlError> {
    let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| UrlError::MissingHost(url.to_string()))?;

    let mut components: Vec<Cow<'_, str>> = vec![Cow::Borrowed(host)];
    components.extend(
        parsed
            .path()
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .map(decode_segment),
    );

    if parsed.path().ends_with('/') {
        components.push(Cow::Borrowed(DIRECTORY_INDEX_FILE));
    }

    let kept: Vec<_> = components.into_iter().skip(trim_lead).collect();
    if kept.is_empty() {
        return Err(UrlError::Malformed(format!(
            "trimming {} components from {} leaves no file name",
            trim_lead, url
        )));
    }

    let mut path = root.to_path_buf();
    for component in kept {
        path.push(component.as_ref());
    }
    Ok(path)
}

/// Percent-decodes a path segment, keeping the raw form if decoding would
/// introduce a separator or invalid UTF-8
fn decode_segment(segment: &str) -> Cow<'_, str> {
    match urlencoding::decode(segment) {
        Ok(decoded) if !decoded.contains(['/', '\\']) && !matches!(decoded.as_ref(), "." | "..") => {
            decoded
        }
        _ => Cow::Borrowed(segment),
    }
}

use crate::UrlError;
use url::Url;

/// Normalizes a URL by collapsing runs of `/` in its path
///
/// The scheme separator (`://`) is preserved, and the query string and
/// fragment are left untouched so that embedded URLs in query parameters
/// survive. The result is the only de-duplication key the pipeline uses.
///
/// Normalization is idempotent: `normalize_url(&normalize_url(u)) == normalize_url(u)`.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::normalize_url;
///
/// assert_eq!(normalize_url("http://h//a//b/"), "http://h/a/b/");
/// assert_eq!(normalize_url("ftp://ftp.example.com//pub///x"), "ftp://ftp.example.com/pub/x");
/// ```
pub fn normalize_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => format!("{}://{}", scheme, collapse_path_slashes(rest)),
        None => collapse_path_slashes(url),
    }
}

/// Collapses repeated slashes up to the start of the query or fragment
fn collapse_path_slashes(input: &str) -> String {
    let split_at = input.find(['?', '#']).unwrap_or(input.len());
    let (path, tail) = input.split_at(split_at);

    let mut collapsed = String::with_capacity(input.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(c);
    }

    collapsed.push_str(tail);
    collapsed
}

/// Resolves an anchor href against the page it was found on, then normalizes it
///
/// Resolution follows RFC 3986 via [`Url::join`], so `file.txt` found on
/// `http://h/docs/` becomes `http://h/docs/file.txt` while `/file.txt`
/// becomes `http://h/file.txt`. Fragments are dropped.
///
/// # Errors
///
/// Returns [`UrlError::Parse`] when either the base or the joined URL is unparsable.
pub fn resolve_anchor(base: &Url, href: &str) -> Result<String, UrlError> {
    let mut joined = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(format!("{} (href '{}')", e, href)))?;
    joined.set_fragment(None);
    Ok(normalize_url(joined.as_str()))
}

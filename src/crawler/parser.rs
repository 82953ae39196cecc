//! Anchor extraction for index pages
//!
//! This module turns an HTML body into the list of links it points at:
//! - Every `<a href>` is resolved against the page URL and normalized
//! - Each link is classified as a directory or a resource
//! - [`route`] decides which queue a link belongs in
//!
//! Nothing here touches a queue; the scrubber owns all queue interaction.

use crate::url::{is_relative_anchor, resolve_anchor, LinkKind, Scheme};
use scraper::{Html, Selector};
use url::Url;

/// A link found on an index page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Absolute, normalized target URL
    pub url: String,

    /// Directory-like or resource-like, judged from the raw href
    pub kind: LinkKind,

    /// Whether the raw href was relative to the page
    pub relative: bool,
}

/// Where the scrubber sends a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Back onto the Frontier Queue for another scrub
    Frontier,
    /// Onto the Link Queue for filtering and fetching
    LinkQueue,
}

/// Decides the queue for a link
///
/// Only relative directory links are recursed into, and only when recursion
/// is enabled. Absolute and foreign directory links are treated like
/// resources, which keeps recursive descent on the seed's site.
///
/// # Example
///
/// ```
/// use sumi_mirror::crawler::{route, ExtractedLink, Route};
/// use sumi_mirror::url::LinkKind;
///
/// let link = ExtractedLink {
///     url: "http://example.test/docs/sub/".to_string(),
///     kind: LinkKind::Directory,
///     relative: true,
/// };
/// assert_eq!(route(&link, true), Route::Frontier);
/// assert_eq!(route(&link, false), Route::LinkQueue);
/// ```
pub fn route(link: &ExtractedLink, recursive: bool) -> Route {
    if link.kind == LinkKind::Directory && recursive && link.relative {
        Route::Frontier
    } else {
        Route::LinkQueue
    }
}

/// Extracts every followable anchor from an HTML body
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links (`#section`)
/// - Anything that does not resolve to `http`, `https` or `ftp`
///
/// # Arguments
///
/// * `html` - The page body
/// * `base_url` - The URL the page was retrieved from
pub fn extract_links(html: &str, base_url: &Url) -> Vec<ExtractedLink> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        if is_excluded(href) {
            continue;
        }

        let url = match resolve_anchor(base_url, href) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping unresolvable href on {}: {}", base_url, e);
                continue;
            }
        };

        let supported = Url::parse(&url)
            .ok()
            .and_then(|u| Scheme::of(&u))
            .is_some();
        if !supported {
            continue;
        }

        links.push(ExtractedLink {
            url,
            kind: LinkKind::of(href),
            relative: is_relative_anchor(href),
        });
    }

    links
}

/// Hrefs that never name a retrievable resource
fn is_excluded(href: &str) -> bool {
    href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
}

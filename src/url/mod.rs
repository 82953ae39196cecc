//! URL handling module for Sumi-Mirror
//!
//! This module provides URL normalization, scheme and directory/resource
//! classification of anchors, and derivation of local mirror paths.

mod local_path;
mod normalize;

pub use local_path::{output_path, DIRECTORY_INDEX_FILE};
pub use normalize::{normalize_url, resolve_anchor};

use url::Url;

/// Anchor prefixes that mark a link as absolute or foreign
///
/// Only anchors starting with none of these are eligible for recursive descent.
const NON_RELATIVE_PREFIXES: &[&str] = &["/", "http", "mailto", "ftp"];

/// URL schemes the pipeline knows how to retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Ftp,
}

impl Scheme {
    /// Classifies a parsed URL by scheme, returning `None` for unsupported schemes
    pub fn of(url: &Url) -> Option<Self> {
        match url.scheme() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "ftp" => Some(Self::Ftp),
            _ => None,
        }
    }

    /// Returns true for HTTP and HTTPS
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

/// Whether an anchor names a browsable directory or a downloadable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Ends in `/` and is neither `/` nor `../`
    Directory,
    /// Anything else
    Resource,
}

impl LinkKind {
    /// Classifies a raw anchor href
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_mirror::url::LinkKind;
    ///
    /// assert_eq!(LinkKind::of("sub/"), LinkKind::Directory);
    /// assert_eq!(LinkKind::of("../"), LinkKind::Resource);
    /// assert_eq!(LinkKind::of("file.txt"), LinkKind::Resource);
    /// ```
    pub fn of(href: &str) -> Self {
        if href.ends_with('/') && href != "/" && href != "../" {
            Self::Directory
        } else {
            Self::Resource
        }
    }
}

/// Returns true if an anchor is relative to the page it was found on
///
/// Anchors starting with `/`, `http`, `mailto` or `ftp` are not relative, which
/// keeps recursive descent scoped to the seed's site.
pub fn is_relative_anchor(href: &str) -> bool {
    !NON_RELATIVE_PREFIXES
        .iter()
        .any(|prefix| href.starts_with(prefix))
}

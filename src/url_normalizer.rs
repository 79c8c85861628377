use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

use crate::error::{MirrorError, Result};
use crate::file_manager::clamp_file_path;

pub const PAGE_EXTENSION: &str = ".html";
pub const INDEX_DOCUMENT: &str = "index.html";
const DEFAULT_SCHEME_PREFIX: &str = "https://";

fn leading_junk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[@#]+").expect("static regex"))
}

fn unsafe_folder_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9-]").expect("static regex"))
}

/// A normalized absolute page URL: `scheme://host[/flattened-path]`.
///
/// The flattened path joins the original path segments with `-`, drops the
/// `.html` extension from each segment and is lowercased. The homepage (empty
/// path or `/index.html`) has no path at all. Query strings and fragments are
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl {
    value: String,
    host: String,
    path: String,
}

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Host including a non-default port, used as the throttling domain.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Flattened path without a leading slash; empty for the homepage.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_homepage(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl Serialize for CanonicalUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

/// Trim, strip leading junk, drop the fragment and add the default scheme.
fn pre_clean(raw: &str) -> String {
    let cleaned = leading_junk().replace(raw.trim(), "");
    let without_fragment = cleaned.split('#').next().unwrap_or_default();
    let lower = without_fragment.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        without_fragment.to_string()
    } else {
        format!(
            "{}{}",
            DEFAULT_SCHEME_PREFIX,
            without_fragment.trim_start_matches('/')
        )
    }
}

fn parse_with_host(raw: &str, candidate: &str) -> Result<Url> {
    let url = Url::parse(candidate).map_err(|e| MirrorError::invalid_url(raw, e.to_string()))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(MirrorError::invalid_url(raw, "no host")),
    }
}

/// `host[:port]` of a parsed URL, the unit of "same domain" comparisons.
pub fn netloc(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

pub fn same_domain(a: &Url, b: &Url) -> bool {
    netloc(a) == netloc(b)
}

fn strip_page_extension(segment: &str) -> &str {
    let mut s = segment;
    while let Some(stripped) = s.strip_suffix(PAGE_EXTENSION) {
        s = stripped;
    }
    s
}

/// Canonicalize a page URL.
///
/// Fails with [`MirrorError::InvalidUrl`] when no host can be parsed even
/// after the default scheme was prepended.
pub fn normalize(raw: &str) -> Result<CanonicalUrl> {
    let url = parse_with_host(raw, &pre_clean(raw))?;
    let host = netloc(&url);
    let origin = format!("{}://{}", url.scheme(), host);

    let path = url.path().trim_matches('/').to_lowercase();
    if path.is_empty() || path == INDEX_DOCUMENT {
        return Ok(CanonicalUrl {
            value: origin,
            host,
            path: String::new(),
        });
    }

    let flattened = path
        .split('/')
        .map(strip_page_extension)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if flattened.is_empty() {
        return Ok(CanonicalUrl {
            value: origin,
            host,
            path: flattened,
        });
    }

    Ok(CanonicalUrl {
        value: format!("{origin}/{flattened}"),
        host,
        path: flattened,
    })
}

/// Lighter normalization for asset URLs: path and query are kept intact since
/// they identify the resource on the server.
pub fn normalize_asset_url(raw: &str) -> Result<Url> {
    parse_with_host(raw, &pre_clean(raw))
}

/// Local page file for a canonical URL: `<base>/index.html` for the homepage,
/// `<base>/<flattened-path>.html` otherwise.
pub fn local_path_for(url: &CanonicalUrl, base_folder: &Path) -> PathBuf {
    if url.is_homepage() {
        return base_folder.join(INDEX_DOCUMENT);
    }
    let mut file_name = url.path().to_string();
    if !file_name.ends_with(PAGE_EXTENSION) {
        file_name.push_str(PAGE_EXTENSION);
    }
    clamp_file_path(base_folder, &file_name)
}

/// Mirror folder name for a site: `www.` and the TLD dropped, anything
/// outside `[A-Za-z0-9-]` replaced with `_`.
pub fn site_folder_name(url: &CanonicalUrl) -> String {
    let host = url.host();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let without_tld = match host.rsplit_once('.') {
        Some((name, _tld)) => name,
        None => host,
    };
    unsafe_folder_chars()
        .replace_all(without_tld, "_")
        .into_owned()
}

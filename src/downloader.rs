use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MirrorError, Result};
use crate::fetcher::RetryingFetcher;
use crate::file_manager::{clamp_file_path, FileManager};
use crate::site_map::SharedSiteMap;
use crate::throttle::DomainThrottler;
use crate::url_normalizer::{netloc, normalize_asset_url, INDEX_DOCUMENT};

/// Asset category; decides the `assets/<folder>` a file lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetBucket {
    #[serde(rename = "js")]
    Script,
    #[serde(rename = "css")]
    Stylesheet,
    #[serde(rename = "images")]
    Image,
    #[serde(rename = "fonts")]
    Font,
    #[serde(rename = "other")]
    Other,
}

const FONT_EXTENSIONS: [&str; 5] = ["woff", "woff2", "ttf", "otf", "eot"];

impl AssetBucket {
    /// Buckets whose folders are created when a mirror is set up.
    pub const STANDARD: [AssetBucket; 4] = [
        AssetBucket::Script,
        AssetBucket::Stylesheet,
        AssetBucket::Image,
        AssetBucket::Font,
    ];

    pub fn folder(self) -> &'static str {
        match self {
            AssetBucket::Script => "js",
            AssetBucket::Stylesheet => "css",
            AssetBucket::Image => "images",
            AssetBucket::Font => "fonts",
            AssetBucket::Other => "other",
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let lower = content_type.to_ascii_lowercase();
        if let Ok(parsed) = lower.parse::<mime::Mime>() {
            if parsed.type_() == mime::IMAGE {
                return Some(AssetBucket::Image);
            }
            if parsed.type_() == mime::FONT {
                return Some(AssetBucket::Font);
            }
            if parsed.type_() == mime::TEXT && parsed.subtype() == mime::CSS {
                return Some(AssetBucket::Stylesheet);
            }
        }

        if lower.contains("javascript") || lower.contains("ecmascript") {
            Some(AssetBucket::Script)
        } else if lower.contains("css") {
            Some(AssetBucket::Stylesheet)
        } else if lower.contains("font") || lower.contains("woff") {
            Some(AssetBucket::Font)
        } else if ["image", "png", "jpg", "jpeg", "gif", "svg"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Some(AssetBucket::Image)
        } else {
            None
        }
    }

    pub fn from_extension(path: &str) -> Option<Self> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())?;
        if FONT_EXTENSIONS.contains(&ext.as_str()) {
            return Some(AssetBucket::Font);
        }
        mime_guess::from_ext(&ext)
            .first()
            .and_then(|m| Self::from_content_type(m.essence_str()))
    }

    /// Hint first, then the declared content type, then the URL's extension.
    pub fn classify(hint: Option<Self>, content_type: Option<&str>, url_path: &str) -> Self {
        hint.or_else(|| content_type.and_then(Self::from_content_type))
            .or_else(|| Self::from_extension(url_path))
            .unwrap_or(AssetBucket::Other)
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect()
}

/// File name for a downloaded asset: the URL's last path segment, or a
/// name synthesized from the content type and a hash of the URL.
pub fn asset_file_name(url: &Url, content_type: Option<&str>) -> String {
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty());
    if let Some(segment) = last_segment {
        return sanitize_file_name(segment);
    }

    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.contains("html") {
        return INDEX_DOCUMENT.to_string();
    }

    let essence = content_type.split(';').next().unwrap_or_default().trim();
    let ext = mime_guess::get_mime_extensions_str(essence)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
    format!("asset_{}{}", &digest[..16], ext)
}

/// Fetches single assets into `assets/<bucket>/` and records them in the site map.
#[derive(Clone)]
pub struct AssetDownloader {
    fetcher: RetryingFetcher,
    throttler: Arc<DomainThrottler>,
    files: FileManager,
    site_map: SharedSiteMap,
}

impl AssetDownloader {
    pub fn new(
        fetcher: RetryingFetcher,
        throttler: Arc<DomainThrottler>,
        files: FileManager,
        site_map: SharedSiteMap,
    ) -> Self {
        Self {
            fetcher,
            throttler,
            files,
            site_map,
        }
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    /// Download `url` and return where it was stored.
    ///
    /// Every failure is logged and reported as [`MirrorError::AssetUnavailable`];
    /// asset failures never abort a crawl. Downloading the same URL again
    /// overwrites the same file.
    pub async fn download_asset(
        &self,
        url: &str,
        bucket_hint: Option<AssetBucket>,
    ) -> Result<PathBuf> {
        let outcome = match normalize_asset_url(url) {
            Ok(parsed) => self.fetch_and_store(&parsed, bucket_hint).await,
            Err(e) => Err(e),
        };

        outcome.map_err(|e| {
            warn!(url, "failed to download asset: {}", e);
            match e {
                MirrorError::AssetUnavailable { .. } => e,
                other => MirrorError::AssetUnavailable {
                    url: url.to_string(),
                    reason: other.to_string(),
                },
            }
        })
    }

    async fn fetch_and_store(&self, url: &Url, bucket_hint: Option<AssetBucket>) -> Result<PathBuf> {
        self.throttler.wait(&netloc(url)).await;

        debug!(url = %url, "downloading asset");
        let response = self.fetcher.fetch(url.as_str()).await?;
        if !response.is_success() {
            return Err(MirrorError::AssetUnavailable {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status),
            });
        }

        let content_type = response.content_type.as_deref();
        let bucket = AssetBucket::classify(bucket_hint, content_type, url.path());
        let dir = self.files.asset_dir(bucket)?;
        let path = clamp_file_path(&dir, &asset_file_name(url, content_type));

        self.files.save_file(&path, &response.body)?;
        debug!(url = %url, path = %path.display(), bucket = bucket.folder(), "saved asset");

        self.site_map.lock().add_asset(url.as_str(), path.clone(), bucket);
        Ok(path)
    }
}

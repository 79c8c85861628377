use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

use crate::downloader::{AssetBucket, AssetDownloader};
use crate::error::{MirrorError, Result};
use crate::file_manager::relative_link;
use crate::html_parser::{Element, HtmlDocument};
use crate::url_normalizer::{local_path_for, normalize, same_domain, INDEX_DOCUMENT, PAGE_EXTENSION};

/// What a rewrite pass did to one page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    /// Absolute same-domain hyperlink targets, in document order.
    pub page_links: Vec<String>,
    pub links_rewritten: usize,
    pub assets_rewritten: usize,
    pub assets_failed: usize,
}

struct AssetRef {
    element: Element,
    attr: &'static str,
    url: String,
    bucket: AssetBucket,
}

fn is_web_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Points a page's links and embedded assets at the local mirror.
#[derive(Clone)]
pub struct LinkRewriter {
    downloader: AssetDownloader,
    max_concurrent: usize,
}

impl LinkRewriter {
    pub fn new(downloader: AssetDownloader, max_concurrent: usize) -> Self {
        Self {
            downloader,
            max_concurrent: max_concurrent.max(1),
        }
    }

    fn base_folder(&self) -> &Path {
        self.downloader.files().base_dir()
    }

    /// Directory the page served from `page_url` is stored in.
    fn page_dir(&self, page_url: &Url) -> PathBuf {
        normalize(page_url.as_str())
            .ok()
            .map(|canonical| local_path_for(&canonical, self.base_folder()))
            .and_then(|path| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.base_folder().to_path_buf())
    }

    /// Rewrite `document` in place. Per-element failures are logged and the
    /// element keeps its original reference.
    pub async fn rewrite(&self, document: &HtmlDocument, page_url: &Url) -> RewriteReport {
        let page_dir = self.page_dir(page_url);
        let mut report = RewriteReport::default();

        self.rewrite_hyperlinks(document, page_url, &page_dir, &mut report);
        self.rewrite_assets(document, page_url, &page_dir, &mut report)
            .await;

        debug!(
            page = %page_url,
            links = report.links_rewritten,
            assets = report.assets_rewritten,
            failed = report.assets_failed,
            "rewrote page"
        );
        report
    }

    fn rewrite_hyperlinks(
        &self,
        document: &HtmlDocument,
        page_url: &Url,
        page_dir: &Path,
        report: &mut RewriteReport,
    ) {
        for anchor in document.find("a") {
            let Some(raw) = anchor.attr("href") else {
                continue;
            };
            let href = raw.trim();
            if href.is_empty() || href.starts_with('#') {
                continue;
            }

            if let Ok(target) = page_url.join(href) {
                if is_web_url(&target) && same_domain(&target, page_url) {
                    report.page_links.push(target.to_string());
                }
            }

            match self.local_href(href, page_url, page_dir) {
                Ok(Some(local)) => {
                    anchor.set_attr("href", &local);
                    report.links_rewritten += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(href, page = %page_url, "failed to rewrite link: {}", e),
            }
        }
    }

    /// Local replacement for a hyperlink, or `None` when it stays as written.
    fn local_href(&self, href: &str, page_url: &Url, page_dir: &Path) -> Result<Option<String>> {
        let lower = href.to_ascii_lowercase();
        let absolute = if lower.starts_with("http://") || lower.starts_with("https://") {
            Some(href.to_string())
        } else if href.starts_with("//") {
            Some(format!("{}:{}", page_url.scheme(), href))
        } else {
            None
        };

        if let Some(absolute) = absolute {
            let target = Url::parse(&absolute)
                .map_err(|e| MirrorError::invalid_url(&absolute, e.to_string()))?;
            if !same_domain(&target, page_url) {
                return Ok(None);
            }
            let local = local_path_for(&normalize(&absolute)?, self.base_folder());
            return Ok(relative_link(&local, page_dir));
        }

        if let Some(rest) = href.strip_prefix('/') {
            let path = rest.split(['#', '?']).next().unwrap_or_default();
            let mut path = path.trim_matches('/').to_string();
            if path.is_empty() {
                return Ok(Some(INDEX_DOCUMENT.to_string()));
            }
            if !path.ends_with(PAGE_EXTENSION) {
                path.push_str(PAGE_EXTENSION);
            }
            return Ok(Some(path));
        }

        Ok(None)
    }

    fn collect_assets(&self, document: &HtmlDocument, page_url: &Url) -> Vec<AssetRef> {
        let mut refs = Vec::new();
        let mut push = |element: Element, attr: &'static str, bucket: AssetBucket| {
            let Some(value) = element.attr(attr) else {
                return;
            };
            let value = value.trim();
            if value.is_empty() {
                return;
            }
            match page_url.join(value) {
                Ok(url) if is_web_url(&url) => refs.push(AssetRef {
                    element,
                    attr,
                    url: url.to_string(),
                    bucket,
                }),
                Ok(_) => {}
                Err(e) => warn!(value, page = %page_url, "unresolvable asset reference: {}", e),
            }
        };

        for img in document.find("img") {
            push(img, "src", AssetBucket::Image);
        }
        for link in document.find("link") {
            if link.has_token("rel", "stylesheet") {
                push(link, "href", AssetBucket::Stylesheet);
            }
        }
        for script in document.find("script") {
            push(script, "src", AssetBucket::Script);
        }
        refs
    }

    async fn rewrite_assets(
        &self,
        document: &HtmlDocument,
        page_url: &Url,
        page_dir: &Path,
        report: &mut RewriteReport,
    ) {
        let refs = self.collect_assets(document, page_url);

        let mut unique: Vec<(&str, AssetBucket)> = Vec::new();
        for asset in &refs {
            if !unique.iter().any(|(url, _)| *url == asset.url) {
                unique.push((asset.url.as_str(), asset.bucket));
            }
        }

        let downloaded: HashMap<&str, Option<PathBuf>> = stream::iter(unique)
            .map(|(url, bucket)| async move {
                let path = self.downloader.download_asset(url, Some(bucket)).await.ok();
                (url, path)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        for asset in &refs {
            let local = downloaded
                .get(asset.url.as_str())
                .and_then(|path| path.as_deref())
                .and_then(|path| relative_link(path, page_dir));
            match local {
                Some(local) => {
                    asset.element.set_attr(asset.attr, &local);
                    report.assets_rewritten += 1;
                }
                None => report.assets_failed += 1,
            }
        }
    }
}

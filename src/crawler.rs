//! The crawl controller.
//!
//! Pages are processed from an explicit LIFO worklist: links discovered on a
//! page are pushed in reverse so they pop in document order, which gives the
//! same visiting order as a depth-first recursion without growing the stack.

use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MirrorError, Result};
use crate::fetcher::RetryingFetcher;
use crate::file_manager::FileManager;
use crate::html_parser::HtmlDocument;
use crate::link_rewriter::{LinkRewriter, RewriteReport};
use crate::site_map::SharedSiteMap;
use crate::throttle::DomainThrottler;
use crate::transport::HttpResponse;
use crate::url_normalizer::{
    local_path_for, normalize, normalize_asset_url, CanonicalUrl, PAGE_EXTENSION,
};

/// Canonical URLs already handled in one crawl run.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: HashSet<CanonicalUrl>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `url` was not yet present.
    pub fn insert(&mut self, url: CanonicalUrl) -> bool {
        self.urls.insert(url)
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyVisited,
    TooDeep,
    /// The page file exists from an earlier run.
    AlreadyMirrored,
}

/// Terminal state of one worklist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Saved(PathBuf),
    Skipped(SkipReason),
    Failed,
}

/// Totals for one crawl run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub pages_saved: usize,
    /// Pages left alone because a previous run already stored them.
    pub pages_skipped: usize,
    pub pages_failed: usize,
    pub links_rewritten: usize,
    pub assets_rewritten: usize,
    pub assets_failed: usize,
}

#[derive(Debug, Clone)]
struct CrawlTask {
    url: String,
    depth: usize,
}

/// URLs tried for a page, in order: the URL as given, without and with the
/// page extension, with a trailing slash, then the canonical form.
/// Query strings and fragments are dropped. Duplicates are removed.
pub fn url_variations(raw: &str, canonical: &CanonicalUrl) -> Vec<String> {
    let mut candidates = Vec::new();

    if let Ok(mut given) = normalize_asset_url(raw) {
        given.set_query(None);
        let has_path = given.path() != "/";
        let given = given.to_string();
        let trimmed = given.trim_end_matches('/');

        candidates.push(given.clone());
        candidates.push(trimmed.strip_suffix(PAGE_EXTENSION).unwrap_or(trimmed).to_string());
        if has_path && !trimmed.ends_with(PAGE_EXTENSION) {
            candidates.push(format!("{trimmed}{PAGE_EXTENSION}"));
        }
        candidates.push(format!("{trimmed}/"));
    }
    candidates.push(canonical.as_str().to_string());

    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

/// Site map key for a page: the URL it was served from, without query or
/// fragment, so the stored structure keeps the site's real path hierarchy.
fn site_map_key(resolved: &Url) -> String {
    let mut key = resolved.clone();
    key.set_query(None);
    key.set_fragment(None);
    key.to_string()
}

/// Drives fetching, rewriting and saving of pages within one site.
pub struct Crawler {
    fetcher: RetryingFetcher,
    throttler: Arc<DomainThrottler>,
    rewriter: LinkRewriter,
    files: FileManager,
    site_map: SharedSiteMap,
    max_depth: usize,
    progress: ProgressBar,
}

impl Crawler {
    pub fn new(
        fetcher: RetryingFetcher,
        throttler: Arc<DomainThrottler>,
        rewriter: LinkRewriter,
        files: FileManager,
        site_map: SharedSiteMap,
        max_depth: usize,
    ) -> Self {
        Self {
            fetcher,
            throttler,
            rewriter,
            files,
            site_map,
            max_depth,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Mirror `start` and every same-domain page reachable from it within
    /// `max_depth` link hops. Failures are contained per page.
    pub async fn crawl(&self, start: &str, visited: &mut VisitedSet) -> CrawlReport {
        let mut report = CrawlReport::default();
        let mut worklist = vec![CrawlTask {
            url: start.to_string(),
            depth: 0,
        }];

        while let Some(task) = worklist.pop() {
            self.progress
                .set_message(format!("[depth {}] {}", task.depth, task.url));

            let outcome = match self.visit(&task, visited).await {
                Ok((outcome, rewrite)) => {
                    if let Some(rewrite) = rewrite {
                        report.links_rewritten += rewrite.links_rewritten;
                        report.assets_rewritten += rewrite.assets_rewritten;
                        report.assets_failed += rewrite.assets_failed;

                        let next_depth = task.depth + 1;
                        if next_depth <= self.max_depth {
                            worklist.extend(rewrite.page_links.into_iter().rev().map(|url| {
                                CrawlTask {
                                    url,
                                    depth: next_depth,
                                }
                            }));
                        }
                    }
                    outcome
                }
                Err(e) => {
                    warn!(url = %task.url, depth = task.depth, "failed to mirror page: {}", e);
                    PageOutcome::Failed
                }
            };

            match outcome {
                PageOutcome::Saved(_) => report.pages_saved += 1,
                PageOutcome::Skipped(SkipReason::AlreadyMirrored) => report.pages_skipped += 1,
                PageOutcome::Skipped(_) => {}
                PageOutcome::Failed => report.pages_failed += 1,
            }
            self.progress.tick();
        }

        info!(
            saved = report.pages_saved,
            skipped = report.pages_skipped,
            failed = report.pages_failed,
            visited = visited.len(),
            "crawl finished"
        );
        report
    }

    async fn visit(
        &self,
        task: &CrawlTask,
        visited: &mut VisitedSet,
    ) -> Result<(PageOutcome, Option<RewriteReport>)> {
        let canonical = normalize(&task.url)?;
        if visited.contains(&canonical) {
            debug!(url = %canonical, "already visited");
            return Ok((PageOutcome::Skipped(SkipReason::AlreadyVisited), None));
        }
        if task.depth > self.max_depth {
            debug!(url = %canonical, depth = task.depth, "beyond max depth");
            return Ok((PageOutcome::Skipped(SkipReason::TooDeep), None));
        }

        // Marked before fetching so a failed page is not fetched again.
        visited.insert(canonical.clone());

        let local_path = local_path_for(&canonical, self.files.base_dir());
        if self.files.file_exists(&local_path) {
            debug!(url = %canonical, path = %local_path.display(), "already mirrored");
            return Ok((PageOutcome::Skipped(SkipReason::AlreadyMirrored), None));
        }

        info!(url = %canonical, depth = task.depth, "mirroring page");
        let (response, resolved) = self
            .fetch_first_variation(&task.url, &canonical)
            .await?;
        if let Ok(resolved_canonical) = normalize(resolved.as_str()) {
            visited.insert(resolved_canonical);
        }
        let resolved_key = site_map_key(&resolved);

        let document =
            HtmlDocument::from_response(&response.body, response.content_type.as_deref());
        let rewrite = self.rewriter.rewrite(&document, &resolved).await;
        let html = document.to_html()?;
        self.files.save_file(&local_path, html.as_bytes())?;
        self.site_map
            .lock()
            .add_page(&resolved_key, local_path.clone());

        debug!(
            url = %resolved_key,
            path = %local_path.display(),
            links = rewrite.page_links.len(),
            "saved page"
        );
        Ok((PageOutcome::Saved(local_path), Some(rewrite)))
    }

    /// First variation answering with a success status, with the URL it
    /// finally resolved to after redirects.
    async fn fetch_first_variation(
        &self,
        raw: &str,
        canonical: &CanonicalUrl,
    ) -> Result<(HttpResponse, Url)> {
        for candidate in url_variations(raw, canonical) {
            self.throttler.wait(canonical.host()).await;
            match self.fetcher.fetch(&candidate).await {
                Ok(response) if response.is_success() => {
                    let resolved = Url::parse(&response.final_url)
                        .or_else(|_| Url::parse(&candidate))
                        .map_err(|e| MirrorError::invalid_url(&candidate, e.to_string()))?;
                    if response.redirected {
                        debug!(from = %candidate, to = %resolved, "followed redirect");
                    }
                    return Ok((response, resolved));
                }
                Ok(response) => {
                    debug!(url = %candidate, status = response.status, "variation rejected")
                }
                Err(e) => debug!(url = %candidate, "variation failed: {}", e),
            }
        }
        Err(MirrorError::PageUnreachable {
            url: canonical.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottleConfig;
    use crate::downloader::AssetDownloader;
    use crate::retry::RetryPolicy;
    use crate::site_map::SiteMap;
    use crate::transport::MockTransport;
    use tempfile::{tempdir, TempDir};

    fn crawler(mock: MockTransport, max_depth: usize) -> (Crawler, SharedSiteMap, TempDir) {
        let temp_dir = tempdir().unwrap();
        let base = temp_dir.path().join("example");
        let files = FileManager::new(&base).unwrap();
        let site_map = SharedSiteMap::new(SiteMap::new("https://example.com", &base));
        let fetcher = RetryingFetcher::new(Arc::new(mock), RetryPolicy::none());
        let throttler = Arc::new(DomainThrottler::new(ThrottleConfig::disabled()));
        let downloader =
            AssetDownloader::new(fetcher.clone(), throttler.clone(), files.clone(), site_map.clone());
        let crawler = Crawler::new(
            fetcher,
            throttler,
            LinkRewriter::new(downloader, 2),
            files,
            site_map.clone(),
            max_depth,
        );
        (crawler, site_map, temp_dir)
    }

    fn not_found(url: &str) -> HttpResponse {
        let mut resp = HttpResponse::ok(url, "text/html", "not found");
        resp.status = 404;
        resp
    }

    #[test]
    fn test_variations_order() {
        let canonical = normalize("https://example.com/about").unwrap();
        assert_eq!(
            url_variations("https://example.com/about", &canonical),
            vec![
                "https://example.com/about",
                "https://example.com/about.html",
                "https://example.com/about/",
            ]
        );

        let canonical = normalize("https://example.com/About.html?x=1").unwrap();
        assert_eq!(
            url_variations("https://example.com/About.html?x=1", &canonical),
            vec![
                "https://example.com/About.html",
                "https://example.com/About",
                "https://example.com/About.html/",
                "https://example.com/about",
            ]
        );
    }

    #[test]
    fn test_homepage_variations() {
        let canonical = normalize("example.com").unwrap();
        assert_eq!(
            url_variations("example.com", &canonical),
            vec!["https://example.com/", "https://example.com"]
        );
    }

    #[test]
    fn test_visited_set_insert_once() {
        let mut visited = VisitedSet::new();
        let url = normalize("https://example.com/a").unwrap();
        assert!(visited.is_empty());
        assert!(visited.insert(url.clone()));
        assert!(!visited.insert(normalize("https://example.com/a.html").unwrap()));
        assert!(visited.contains(&url));
        assert_eq!(visited.len(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_html_variation() {
        let mut mock = MockTransport::new();
        mock.expect_get().returning(|url| match url {
            "https://example.com/docs.html" => Ok(HttpResponse::ok(url, "text/html", "<p>docs</p>")),
            _ => Ok(not_found(url)),
        });
        let (crawler, site_map, temp_dir) = crawler(mock, 0);
        let mut visited = VisitedSet::new();

        let report = crawler.crawl("https://example.com/docs", &mut visited).await;

        assert_eq!(report.pages_saved, 1);
        let saved = temp_dir.path().join("example/docs.html");
        assert!(std::fs::read_to_string(saved).unwrap().contains("<p>docs</p>"));
        assert!(site_map.lock().page("https://example.com/docs.html").is_some());
    }

    #[tokio::test]
    async fn test_nested_page_keeps_path_in_site_map() {
        let mut mock = MockTransport::new();
        mock.expect_get()
            .withf(|url| url == "https://example.com/docs/intro")
            .times(1)
            .returning(|url| Ok(HttpResponse::ok(url, "text/html", "<p>intro</p>")));
        let (crawler, site_map, temp_dir) = crawler(mock, 0);
        let mut visited = VisitedSet::new();

        crawler
            .crawl("https://example.com/docs/intro?ref=nav#top", &mut visited)
            .await;

        let map = site_map.lock();
        let saved = temp_dir.path().join("example/docs-intro.html");
        assert_eq!(map.page("https://example.com/docs/intro"), Some(saved.as_path()));
        let snapshot = map.snapshot();
        assert_eq!(
            snapshot.pages.children["docs"].children["intro"].file,
            Some(saved.clone())
        );
    }

    #[tokio::test]
    async fn test_latin1_page_saved_as_utf8() {
        let mut mock = MockTransport::new();
        mock.expect_get().returning(|url| {
            Ok(HttpResponse::ok(
                url,
                "text/html; charset=iso-8859-1",
                &b"<html><body><p>caf\xe9</p></body></html>"[..],
            ))
        });
        let (crawler, _, temp_dir) = crawler(mock, 0);
        let mut visited = VisitedSet::new();

        crawler.crawl("https://example.com/menu", &mut visited).await;

        let saved = std::fs::read(temp_dir.path().join("example/menu.html")).unwrap();
        let saved = String::from_utf8(saved).unwrap();
        assert!(saved.contains("<p>café</p>"), "{saved}");
    }

    #[tokio::test]
    async fn test_unreachable_page_is_failed_and_not_refetched() {
        let mut mock = MockTransport::new();
        mock.expect_get().times(3).returning(|url| Ok(not_found(url)));
        let (crawler, site_map, _temp_dir) = crawler(mock, 1);
        let mut visited = VisitedSet::new();

        let report = crawler.crawl("https://example.com/gone", &mut visited).await;
        let again = crawler.crawl("https://example.com/gone", &mut visited).await;

        assert_eq!(report.pages_failed, 1);
        assert_eq!(again, CrawlReport::default());
        assert_eq!(site_map.lock().page_count(), 0);
    }

    #[tokio::test]
    async fn test_redirect_marks_both_urls_visited() {
        let mut mock = MockTransport::new();
        mock.expect_get().times(1).returning(|url| {
            let mut resp = HttpResponse::ok(url, "text/html", "<p>new</p>");
            resp.final_url = "https://example.com/new-home".to_string();
            resp.redirected = true;
            Ok(resp)
        });
        let (crawler, site_map, _temp_dir) = crawler(mock, 0);
        let mut visited = VisitedSet::new();

        crawler.crawl("https://example.com/old", &mut visited).await;

        assert!(visited.contains(&normalize("https://example.com/old").unwrap()));
        assert!(visited.contains(&normalize("https://example.com/new-home").unwrap()));
        let map = site_map.lock();
        assert!(map.page("https://example.com/new-home").unwrap().ends_with("old.html"));
    }

    #[tokio::test]
    async fn test_invalid_start_is_failed() {
        let (crawler, _, _temp_dir) = crawler(MockTransport::new(), 3);
        let mut visited = VisitedSet::new();
        let report = crawler.crawl("   ", &mut visited).await;
        assert_eq!(report.pages_failed, 1);
        assert!(visited.is_empty());
    }
}

use indicatif::ProgressBar;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::MirrorConfig;
use crate::crawler::{url_variations, CrawlReport, Crawler, VisitedSet};
use crate::downloader::AssetDownloader;
use crate::error::{MirrorError, Result, TransportError};
use crate::fetcher::RetryingFetcher;
use crate::file_manager::FileManager;
use crate::link_rewriter::LinkRewriter;
use crate::site_map::{SharedSiteMap, SiteMap};
use crate::throttle::DomainThrottler;
use crate::transport::{HttpTransport, Transport};
use crate::url_normalizer::{normalize, site_folder_name, CanonicalUrl};

/// Outcome of a whole mirror run.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorReport {
    pub start_url: String,
    pub site_folder: PathBuf,
    #[serde(flatten)]
    pub crawl: CrawlReport,
    /// Assets recorded in the site map.
    pub assets_saved: usize,
    /// `website_map.json` and `website_structure.txt`, when they could be written.
    pub map_files: Option<(PathBuf, PathBuf)>,
}

/// Mirrors one website into `<output_dir>/<site folder>`.
pub struct WebsiteMirror {
    config: MirrorConfig,
    transport: Arc<dyn Transport>,
    progress: ProgressBar,
}

impl WebsiteMirror {
    pub fn new(config: MirrorConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            progress: ProgressBar::hidden(),
        }
    }

    /// A mirror using the reqwest transport built from `config.transport`.
    pub fn with_http(config: MirrorConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.transport.clone())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn site_folder(&self, start: &CanonicalUrl) -> PathBuf {
        self.config.output_dir.join(site_folder_name(start))
    }

    /// Validate `url`, crawl the site and save the site map.
    ///
    /// Only an invalid or unreachable starting URL or a failure to create the
    /// mirror folder ends the run with an error; everything else is contained
    /// and shows up in the report.
    pub async fn run(&self, url: &str) -> Result<MirrorReport> {
        let start = normalize(url)?;
        let fetcher = RetryingFetcher::new(self.transport.clone(), self.config.retry);

        if self.config.preflight {
            self.preflight(&fetcher, url, &start).await?;
        }

        let base = self.site_folder(&start);
        let files = FileManager::new(&base)?;
        files.create_asset_folders()?;
        info!(url = %start, folder = %base.display(), max_depth = self.config.max_depth, "starting mirror");

        let site_map = SharedSiteMap::new(SiteMap::new(start.as_str(), &base));
        let throttler = Arc::new(DomainThrottler::new(self.config.throttle));
        let downloader = AssetDownloader::new(
            fetcher.clone(),
            throttler.clone(),
            files.clone(),
            site_map.clone(),
        );
        let crawler = Crawler::new(
            fetcher,
            throttler,
            LinkRewriter::new(downloader, self.config.max_concurrent),
            files,
            site_map.clone(),
            self.config.max_depth,
        )
        .with_progress(self.progress.clone());

        let mut visited = VisitedSet::new();
        let crawl = crawler.crawl(url, &mut visited).await;

        let map = site_map.lock();
        let map_files = match map.save() {
            Ok(paths) => Some(paths),
            Err(e) => {
                error!(folder = %base.display(), "failed to save site map: {}", e);
                None
            }
        };

        Ok(MirrorReport {
            start_url: start.to_string(),
            site_folder: base,
            crawl,
            assets_saved: map.asset_count(),
            map_files,
        })
    }

    /// HEAD the URL variations of the start page in crawl order until one
    /// answers. 405 is accepted since some servers refuse HEAD but serve GET.
    async fn preflight(
        &self,
        fetcher: &RetryingFetcher,
        url: &str,
        start: &CanonicalUrl,
    ) -> Result<()> {
        let mut rejected = false;
        let mut last_error = None;
        for candidate in url_variations(url, start) {
            match fetcher.head(&candidate).await {
                Ok(status) if status < 400 || status == 405 => {
                    info!(url = %candidate, status, "start URL reachable");
                    return Ok(());
                }
                Ok(status) => {
                    debug!(url = %candidate, status, "start URL variation rejected");
                    rejected = true;
                }
                Err(e) => {
                    debug!(url = %candidate, "start URL variation failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        error!(url = %start, "start URL rejected");
        match last_error {
            Some(e) if !rejected => Err(e.into()),
            _ => Err(MirrorError::PageUnreachable {
                url: start.to_string(),
            }),
        }
    }
}

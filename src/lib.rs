pub mod cli;
pub mod config;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod file_manager;
pub mod html_parser;
pub mod link_rewriter;
pub mod logging;
pub mod mirror;
pub mod retry;
pub mod site_map;
pub mod throttle;
pub mod transport;
pub mod url_normalizer;

// Re-export main types for convenience
pub use cli::MirrorCommand;
pub use config::{MirrorConfig, ThrottleConfig};
pub use crawler::{CrawlReport, Crawler, PageOutcome, VisitedSet};
pub use downloader::{AssetBucket, AssetDownloader};
pub use error::{FetchError, MirrorError, TransportError};
pub use fetcher::RetryingFetcher;
pub use file_manager::FileManager;
pub use html_parser::HtmlDocument;
pub use link_rewriter::{LinkRewriter, RewriteReport};
pub use mirror::{MirrorReport, WebsiteMirror};
pub use retry::RetryPolicy;
pub use site_map::{SharedSiteMap, SiteMap};
pub use throttle::DomainThrottler;
pub use transport::{HttpResponse, HttpTransport, Transport, TransportConfig};
pub use url_normalizer::{local_path_for, normalize, CanonicalUrl};

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use url::Url;

use site_mirror::{
    local_path_for, normalize, AssetBucket, AssetDownloader, DomainThrottler, FileManager,
    HtmlDocument, HttpResponse, LinkRewriter, RetryPolicy, RetryingFetcher, SharedSiteMap,
    SiteMap, ThrottleConfig, Transport, TransportError,
};

const PAGE: &str = r#"
    <html>
        <head><title>Bench</title></head>
        <body>
            <a href="/about">About</a>
            <a href="/contact.html">Contact</a>
            <a href="https://example.com/Products/Widgets/">Products</a>
            <a href="https://other.com/x">Elsewhere</a>
            <a href="#top">Top</a>
            <a href="team/people">Team</a>
        </body>
    </html>
"#;

/// Answers 404 to everything; the benchmarked page has no assets.
struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let mut resp = HttpResponse::ok(url, "text/plain", "");
        resp.status = 404;
        Ok(resp)
    }

    async fn head(&self, _url: &str) -> Result<u16, TransportError> {
        Ok(404)
    }
}

fn bench_normalize(c: &mut Criterion) {
    let urls = [
        "example.com/About/",
        "https://example.com/docs/intro.html#setup",
        "  @@https://www.example.com:8080/a//b/c.html ",
        "https://example.com/index.html",
    ];

    c.bench_function("normalize_urls", |b| {
        b.iter(|| {
            for url in &urls {
                let _canonical = normalize(black_box(url)).unwrap();
            }
        });
    });
}

fn bench_local_paths(c: &mut Criterion) {
    let canonical: Vec<_> = ["https://example.com", "https://example.com/a/b/c", "https://example.com/about"]
        .iter()
        .map(|u| normalize(u).unwrap())
        .collect();
    let base = Path::new("/tmp/mirror/example");

    c.bench_function("local_path_for", |b| {
        b.iter(|| {
            for url in &canonical {
                let _path = local_path_for(black_box(url), base);
            }
        });
    });
}

fn bench_bucket_classification(c: &mut Criterion) {
    let cases = [
        (None, Some("text/css; charset=utf-8"), "/site.css"),
        (None, None, "/fonts/inter.woff2"),
        (None, Some("application/octet-stream"), "/app.js"),
        (Some(AssetBucket::Image), None, "/download"),
    ];

    c.bench_function("classify_assets", |b| {
        b.iter(|| {
            for (hint, ct, path) in &cases {
                let _bucket = AssetBucket::classify(*hint, *ct, black_box(path));
            }
        });
    });
}

fn bench_parse_and_serialize(c: &mut Criterion) {
    c.bench_function("parse_serialize_page", |b| {
        b.iter(|| {
            let doc = HtmlDocument::parse(black_box(PAGE));
            let _links = doc.find("a");
            let _html = doc.to_html().unwrap();
        });
    });
}

fn bench_rewrite_links(c: &mut Criterion) {
    let temp_dir = tempdir().unwrap();
    let base = temp_dir.path().join("example");
    let files = FileManager::new(&base).unwrap();
    let downloader = AssetDownloader::new(
        RetryingFetcher::new(Arc::new(NullTransport), RetryPolicy::none()),
        Arc::new(DomainThrottler::new(ThrottleConfig::disabled())),
        files,
        SharedSiteMap::new(SiteMap::new("https://example.com", &base)),
    );
    let rewriter = LinkRewriter::new(downloader, 4);
    let page_url = Url::parse("https://example.com/").unwrap();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("rewrite_page_links", |b| {
        b.iter(|| {
            let doc = HtmlDocument::parse(PAGE);
            runtime.block_on(rewriter.rewrite(black_box(&doc), &page_url))
        });
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_local_paths,
    bench_bucket_classification,
    bench_parse_and_serialize,
    bench_rewrite_links,
);
criterion_main!(benches);

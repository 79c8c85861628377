use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use site_mirror::logging::{init_logging, init_logging_stderr};
use site_mirror::url_normalizer::{normalize, site_folder_name};
use site_mirror::{MirrorCommand, MirrorReport, WebsiteMirror};

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();
    let config = args.to_config();

    let start = normalize(&args.url).with_context(|| format!("invalid URL '{}'", args.url))?;
    let site = site_folder_name(&start);
    if let Err(e) = init_logging(&config.output_dir, &site) {
        init_logging_stderr()?;
        tracing::warn!("falling back to stderr logging: {:#}", e);
    }

    println!("🚀 Starting website mirroring for: {}", start.as_str().blue());
    println!("📁 Output directory: {:?}", config.output_dir.join(&site));
    println!("🔗 Max depth: {}", config.max_depth);
    println!("⚡ Max concurrent downloads: {}", config.max_concurrent);

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    progress_bar.enable_steady_tick(Duration::from_millis(120));

    let mirror = WebsiteMirror::with_http(config)
        .context("failed to build HTTP client")?
        .with_progress(progress_bar.clone());
    let result = mirror.run(&args.url).await;
    progress_bar.finish_and_clear();

    let report = result.with_context(|| format!("mirroring {} failed", start))?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &MirrorReport) {
    let crawl = &report.crawl;
    println!("✅ Website mirroring completed: {}", report.start_url.green());
    println!("📄 Pages saved: {}", crawl.pages_saved.to_string().green());
    if crawl.pages_skipped > 0 {
        println!("⏭️  Pages already mirrored: {}", crawl.pages_skipped);
    }
    if crawl.pages_failed > 0 {
        println!("❌ Pages failed: {}", crawl.pages_failed.to_string().red());
    }
    println!("📦 Assets saved: {}", report.assets_saved.to_string().green());
    if crawl.assets_failed > 0 {
        println!("⚠️  Asset references left unrewritten: {}", crawl.assets_failed.to_string().yellow());
    }
    match &report.map_files {
        Some((map, structure)) => {
            println!("🗺️  Site map: {}", map.display());
            println!("🗒️  Structure: {}", structure.display());
        }
        None => println!("{}", "⚠️  Site map could not be saved".yellow()),
    }
}

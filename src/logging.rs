use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,site_mirror=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Name of the per-site log file inside `output_dir`.
pub fn log_file_path(output_dir: &Path, site: &str) -> PathBuf {
    output_dir.join(format!("{site}_mirror.log"))
}

/// Initialize structured logging to `<output_dir>/<site>_mirror.log`.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logging(output_dir: &Path, site: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let path = log_file_path(output_dir, site);

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!(e))?;

    tracing::info!("site-mirror logging initialized at {}", path.display());
    Ok(path)
}

/// Fallback when the log file cannot be opened.
pub fn init_logging_stderr() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}

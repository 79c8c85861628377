use clap::builder::RangedU64ValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::MirrorConfig;
use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;

#[derive(Parser, Debug)]
#[command(
    name = "site-mirror",
    about = "Mirror a website into a local folder",
    version,
    long_about = "Downloads the pages of a website reachable from a starting URL, together with their scripts, stylesheets and images, and rewrites links so the copy can be browsed offline. Writes website_map.json and website_structure.txt into the mirror folder."
)]
pub struct MirrorCommand {
    /// The URL of the website to mirror
    #[arg(required = true)]
    pub url: String,

    /// Directory the site folder is created in
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Maximum link depth from the starting page (0 = starting page only)
    #[arg(short = 'd', long, default_value = "3")]
    pub max_depth: usize,

    /// Maximum concurrent asset downloads per page
    #[arg(
        short = 'c',
        long,
        default_value = "4",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub max_concurrent: usize,

    /// User agent string to use for requests
    #[arg(long, default_value = "SiteMirror/1.0")]
    pub user_agent: String,

    /// Timeout for requests in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Retries after a failed request
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Skip the HEAD check of the starting URL
    #[arg(long)]
    pub no_preflight: bool,
}

impl MirrorCommand {
    pub fn to_config(&self) -> MirrorConfig {
        let retry = RetryPolicy {
            retries: self.retries,
            ..RetryPolicy::default()
        };
        MirrorConfig {
            output_dir: self.output_dir.clone(),
            max_depth: self.max_depth,
            max_concurrent: self.max_concurrent,
            preflight: !self.no_preflight,
            retry,
            transport: TransportConfig {
                user_agent: self.user_agent.clone(),
                timeout: Duration::from_secs(self.timeout),
                ..TransportConfig::default()
            },
            ..MirrorConfig::default()
        }
    }
}

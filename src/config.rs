use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;

/// Per-domain politeness parameters for the [`DomainThrottler`](crate::throttle::DomainThrottler).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Lower bound of the randomized delay between requests to one domain.
    pub min_interval: Duration,
    /// Upper bound of the randomized delay.
    pub max_interval: Duration,
    /// Once a domain has seen more requests than this, both bounds double.
    pub hot_domain_threshold: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(500),
            hot_domain_threshold: 3,
        }
    }
}

impl ThrottleConfig {
    /// No spacing at all; used by tests and local mirrors.
    pub fn disabled() -> Self {
        Self {
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            hot_domain_threshold: u32::MAX,
        }
    }
}

/// Everything a mirror run needs besides the starting URL.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Parent directory; the site folder is created inside it.
    pub output_dir: PathBuf,
    /// Pages deeper than this many link hops from the start are not fetched.
    pub max_depth: usize,
    /// Asset downloads in flight at once for a single page.
    pub max_concurrent: usize,
    /// Check the starting URL with HEAD before crawling.
    pub preflight: bool,
    pub retry: RetryPolicy,
    pub throttle: ThrottleConfig,
    pub transport: TransportConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            max_depth: 3,
            max_concurrent: 4,
            preflight: true,
            retry: RetryPolicy::default(),
            throttle: ThrottleConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

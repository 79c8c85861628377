//! Stub transport for integration tests.
//!
//! Serves canned responses by exact URL and records every request.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use site_mirror::{
    HttpResponse, MirrorConfig, RetryPolicy, ThrottleConfig, Transport, TransportError,
};

#[derive(Default, Clone)]
pub struct StubTransport {
    /// Canned responses indexed by URL
    responses: Arc<RwLock<HashMap<String, HttpResponse>>>,
    get_calls: Arc<RwLock<Vec<String>>>,
    head_calls: Arc<RwLock<Vec<String>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: &str, response: HttpResponse) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.to_string(), response);
        self
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_response(url, HttpResponse::ok(url, "text/html; charset=utf-8", html))
    }

    pub fn with_asset(self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.with_response(url, HttpResponse::ok(url, content_type, body))
    }

    /// URLs requested with GET, in order.
    pub fn get_calls(&self) -> Vec<String> {
        self.get_calls.read().unwrap().clone()
    }

    pub fn get_count(&self, url: &str) -> usize {
        self.get_calls.read().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn head_calls(&self) -> Vec<String> {
        self.head_calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.get_calls.write().unwrap().push(url.to_string());
        let canned = self.responses.read().unwrap().get(url).cloned();
        Ok(canned.unwrap_or_else(|| {
            let mut missing = HttpResponse::ok(url, "text/html", "not found");
            missing.status = 404;
            missing
        }))
    }

    async fn head(&self, url: &str) -> Result<u16, TransportError> {
        self.head_calls.write().unwrap().push(url.to_string());
        let responses = self.responses.read().unwrap();
        let status = responses
            .get(url)
            .or_else(|| responses.get(&format!("{url}/")))
            .map_or(404, |r| r.status);
        Ok(status)
    }
}

/// Config for fast, deterministic test runs writing under `output_dir`.
pub fn test_config(output_dir: &Path, max_depth: usize) -> MirrorConfig {
    MirrorConfig {
        output_dir: output_dir.to_path_buf(),
        max_depth,
        retry: RetryPolicy::none(),
        throttle: ThrottleConfig::disabled(),
        ..MirrorConfig::default()
    }
}

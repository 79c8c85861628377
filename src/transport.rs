use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect, Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::retry::{ErrorKind, RetryDecision, RetryPolicy, RETRYABLE_STATUSES};

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// URL after following redirects.
    pub final_url: String,
    pub redirected: bool,
}

impl HttpResponse {
    /// A `200 OK` response served from `url` without redirects.
    pub fn ok(url: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
            final_url: url.to_string(),
            redirected: false,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The HTTP client seam. Implementations must report connection failures,
/// timeouts and malformed URLs as distinct [`TransportError`] variants.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url`, following redirects.
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;

    /// HEAD `url`, following redirects; returns the final status.
    async fn head(&self, url: &str) -> Result<u16, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Statuses the transport re-requests itself before handing the response up.
    pub retry_statuses: Vec<u16>,
    pub status_retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: "SiteMirror/1.0".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            retry_statuses: RETRYABLE_STATUSES.to_vec(),
            status_retry: RetryPolicy::default(),
        }
    }
}

/// [`Transport`] backed by a rustls `reqwest` client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| TransportError::Other(format!("building HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn should_retry_status(&self, status: u16, attempt: u32) -> Option<Duration> {
        if !self.config.retry_statuses.contains(&status) {
            return None;
        }
        match self.config.status_retry.decide(attempt, ErrorKind::Transient) {
            RetryDecision::RetryAfter(delay) => Some(delay),
            RetryDecision::NoRetry => None,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let mut attempt = 1u32;
        loop {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();

            if let Some(delay) = self.should_retry_status(status, attempt) {
                debug!(url, status, attempt, "retryable status, re-requesting");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let redirected = Url::parse(url).ok().as_ref() != Some(response.url());
            let final_url = response.url().to_string();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?.to_vec();

            return Ok(HttpResponse {
                status,
                content_type,
                body,
                final_url,
                redirected,
            });
        }
    }

    async fn head(&self, url: &str) -> Result<u16, TransportError> {
        let mut attempt = 1u32;
        loop {
            let status = self.client.head(url).send().await?.status().as_u16();
            match self.should_retry_status(status, attempt) {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Ok(status),
            }
        }
    }
}

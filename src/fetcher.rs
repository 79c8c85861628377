use std::sync::Arc;

use crate::error::{FetchError, TransportError};
use crate::retry::{classify_status, run_with_retry, ErrorKind, RetryPolicy};
use crate::transport::{HttpResponse, Transport};

/// Wraps a [`Transport`] with the crawl's [`RetryPolicy`].
///
/// Transport failures and 429/5xx responses are retried with backoff; any
/// other response (including 404) is returned to the caller as-is.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let transport = &self.transport;
        run_with_retry(&self.policy, url, move || async move {
            let response = transport.get(url).await?;
            if classify_status(response.status) == ErrorKind::Transient {
                return Err(TransportError::Status(response.status));
            }
            Ok(response)
        })
        .await
    }

    /// HEAD request with the same retry semantics as [`fetch`](Self::fetch).
    pub async fn head(&self, url: &str) -> Result<u16, FetchError> {
        let transport = &self.transport;
        run_with_retry(&self.policy, url, move || async move {
            let status = transport.head(url).await?;
            if classify_status(status) == ErrorKind::Transient {
                return Err(TransportError::Status(status));
            }
            Ok(status)
        })
        .await
    }
}

//! Outbound HTTP to the device cluster.
//!
//! One [`Transactor`] is shared by the stat and translation paths. Each
//! attempt, body read included, runs under `xmidt.request_timeout`; a transport failure or an
//! expired deadline becomes a 503 and is retried `xmidt.retries` more times,
//! `xmidt.retry_interval` apart. Any answer from the cluster, whatever its
//! status, ends the loop.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use tracing::{debug, warn};

use crate::config::XmidtConfig;
use crate::error::GatewayError;

/// What the cluster answered.
#[derive(Debug, Clone)]
pub struct XmidtResponse {
    pub code: StatusCode,
    pub body: Bytes,
    /// Response headers whose name starts with `X`.
    pub forwarded_headers: HeaderMap,
}

pub struct Transactor {
    client: reqwest::Client,
    request_timeout: Duration,
    retries: u32,
    retry_interval: Duration,
}

impl Transactor {
    pub fn new(config: &XmidtConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.client_timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build xmidt client: {e}")))?;
        Ok(Self {
            client,
            request_timeout: config.request_timeout,
            retries: config.retries,
            retry_interval: config.retry_interval,
        })
    }

    /// Start an outbound request on the shared client.
    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    /// Send `request`, retrying unreachable-upstream failures.
    pub async fn transact(&self, request: reqwest::Request) -> Result<XmidtResponse, GatewayError> {
        let mut attempt = 0;
        loop {
            // Bodies here are always in-memory, so cloning only fails for streams.
            let Some(this_attempt) = (attempt < self.retries)
                .then(|| request.try_clone())
                .flatten()
            else {
                return self.attempt(request).await;
            };

            match self.attempt(this_attempt).await {
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    warn!(
                        url = %request.url(),
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "Upstream unavailable, retrying"
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
                result => return result,
            }
        }
    }

    async fn attempt(&self, request: reqwest::Request) -> Result<XmidtResponse, GatewayError> {
        let url = request.url().clone();
        let exchange = async {
            let response = self.client.execute(request).await?;
            let code = response.status();
            let forwarded_headers = forwardable(response.headers());
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((code, forwarded_headers, body))
        };

        let (code, forwarded_headers, body) =
            match tokio::time::timeout(self.request_timeout, exchange).await {
                Ok(Ok(answer)) => answer,
                Ok(Err(e)) => {
                    return Err(GatewayError::unavailable(format!(
                        "error reaching {url}: {e}"
                    )))
                }
                Err(_) => {
                    return Err(GatewayError::unavailable(format!(
                        "request to {url} timed out after {:?}",
                        self.request_timeout
                    )))
                }
            };

        debug!(%url, status = code.as_u16(), bytes = body.len(), "Upstream answered");
        Ok(XmidtResponse {
            code,
            body,
            forwarded_headers,
        })
    }
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if name.as_str().starts_with(['x', 'X']) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

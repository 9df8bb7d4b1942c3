//! Outbound `Authorization` acquisition.
//!
//! Two acquirers exist, selected once at startup from `[acquirer]`:
//!
//! - [`FixedAcquirer`]: a static credential, sent verbatim, never any I/O.
//! - [`RemoteBearerAcquirer`]: fetches a bearer token from an auth endpoint
//!   and caches it until `expiry - buffer`.
//!
//! ## Refresh discipline
//!
//! The cached token sits behind a reader/writer lock. Readers check
//! freshness under the read lock and return immediately on the hot path. A
//! stale reader drops the read lock, takes the write lock, and re-checks
//! freshness before doing any I/O, so N concurrent callers that all observe a
//! stale token trigger exactly one refresh. A failed refresh leaves the
//! previous token in place and returns the error to the caller.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{AcquirerConfig, ExpirationFormat, RemoteAcquirerConfig};

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("empty credentials")]
    EmptyCredentials,
    #[error("no acquirer configured: set acquirer.basic or [acquirer.remote]")]
    NotConfigured,
    #[error("failed to build token client: {0}")]
    Client(reqwest::Error),
    #[error("error making request to {url} to acquire bearer token: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("received non 200 code acquiring bearer token: {0}")]
    Status(StatusCode),
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// The configured source of outbound credentials.
pub enum Acquirer {
    Fixed(FixedAcquirer),
    Remote(RemoteBearerAcquirer),
}

impl Acquirer {
    /// Remote wins when both a remote endpoint and a fixed credential are set.
    pub fn from_config(config: &AcquirerConfig) -> Result<Self, AcquireError> {
        if let Some(remote) = &config.remote {
            return Ok(Self::Remote(RemoteBearerAcquirer::new(remote)?));
        }
        match &config.basic {
            Some(basic) => Ok(Self::Fixed(FixedAcquirer::new(basic.clone())?)),
            None => Err(AcquireError::NotConfigured),
        }
    }

    /// Value for the outbound `Authorization` header.
    pub async fn acquire(&self) -> Result<String, AcquireError> {
        match self {
            Self::Fixed(fixed) => Ok(fixed.acquire()),
            Self::Remote(remote) => remote.acquire().await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fixed(_) => "fixed",
            Self::Remote(_) => "remote",
        }
    }
}

/// Static credential acquirer.
pub struct FixedAcquirer {
    value: String,
}

impl FixedAcquirer {
    pub fn new(value: String) -> Result<Self, AcquireError> {
        if value.trim().is_empty() {
            return Err(AcquireError::EmptyCredentials);
        }
        Ok(Self { value })
    }

    pub fn acquire(&self) -> String {
        self.value.clone()
    }
}

/// Extracts the token and its expiry from an auth endpoint response body.
#[derive(Debug, Clone)]
pub struct TokenParser {
    pub token_field: String,
    pub expiration_field: String,
    pub expiration: ExpirationFormat,
}

impl TokenParser {
    pub fn parse(&self, body: &[u8], now: DateTime<Utc>) -> Result<(String, DateTime<Utc>), AcquireError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AcquireError::InvalidResponse(e.to_string()))?;

        let token = value
            .get(&self.token_field)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AcquireError::InvalidResponse(format!("missing {}", self.token_field)))?;

        let seconds = value
            .get(&self.expiration_field)
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                AcquireError::InvalidResponse(format!("missing {}", self.expiration_field))
            })?;

        #[allow(clippy::cast_possible_truncation)]
        let expires_at = match self.expiration {
            ExpirationFormat::Relative => TimeDelta::try_milliseconds((seconds * 1000.0) as i64)
                .and_then(|d| now.checked_add_signed(d)),
            ExpirationFormat::Absolute => DateTime::from_timestamp(seconds as i64, 0),
        }
        .ok_or_else(|| AcquireError::InvalidResponse(format!("expiry {seconds} out of range")))?;

        Ok((token.to_string(), expires_at))
    }
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Bearer token acquirer backed by a remote auth endpoint.
pub struct RemoteBearerAcquirer {
    client: reqwest::Client,
    auth_url: String,
    request_headers: Vec<(String, String)>,
    buffer: TimeDelta,
    parser: TokenParser,
    cached: RwLock<CachedToken>,
}

impl RemoteBearerAcquirer {
    pub fn new(config: &RemoteAcquirerConfig) -> Result<Self, AcquireError> {
        if config.auth_url.trim().is_empty() {
            return Err(AcquireError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(AcquireError::Client)?;

        Ok(Self {
            client,
            auth_url: config.auth_url.clone(),
            request_headers: config
                .request_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            buffer: TimeDelta::from_std(config.buffer).unwrap_or(TimeDelta::MAX),
            parser: TokenParser {
                token_field: config.token_field.clone(),
                expiration_field: config.expiration_field.clone(),
                expiration: config.expiration,
            },
            cached: RwLock::new(CachedToken {
                value: String::new(),
                expires_at: DateTime::<Utc>::MIN_UTC,
            }),
        })
    }

    /// `Fresh` while `now + buffer` is still before the expiry.
    fn is_fresh(&self, token: &CachedToken) -> bool {
        Utc::now()
            .checked_add_signed(self.buffer)
            .is_some_and(|deadline| deadline < token.expires_at)
    }

    pub async fn acquire(&self) -> Result<String, AcquireError> {
        {
            let cached = self.cached.read().await;
            if self.is_fresh(&cached) {
                return Ok(cached.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if self.is_fresh(&cached) {
            return Ok(cached.value.clone());
        }

        let (token, expires_at) = self.fetch().await.inspect_err(|e| {
            warn!(url = %self.auth_url, error = %e, "Bearer token refresh failed");
        })?;
        cached.value = format!("Bearer {token}");
        cached.expires_at = expires_at;
        debug!(url = %self.auth_url, %expires_at, "Bearer token refreshed");
        Ok(cached.value.clone())
    }

    async fn fetch(&self) -> Result<(String, DateTime<Utc>), AcquireError> {
        let mut request = self.client.get(&self.auth_url);
        for (name, value) in &self.request_headers {
            request = request.header(name, value);
        }

        let request_error = |source| AcquireError::Request {
            url: self.auth_url.clone(),
            source,
        };
        let response = request.send().await.map_err(request_error)?;
        if response.status() != StatusCode::OK {
            return Err(AcquireError::Status(response.status()));
        }
        let body = response.bytes().await.map_err(request_error)?;
        self.parser.parse(&body, Utc::now())
    }
}

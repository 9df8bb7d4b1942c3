//! Transaction id propagation.
//!
//! Every request gets a transaction id: the client's
//! `X-WebPA-Transaction-Id` if it sent a non-empty one, otherwise 16 random
//! bytes encoded as unpadded URL-safe base64. The id is stored as a
//! [`TransactionId`] request extension, echoed on the response (errors
//! included), and attached to the log line of every failed request.

use std::fmt;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tracing::{error, warn};

use crate::error::ErrorDetail;

pub const TRANSACTION_ID_HEADER: &str = "X-WebPA-Transaction-Id";

static TRANSACTION_ID_HEADER_NAME: HeaderName = HeaderName::from_static("x-webpa-transaction-id");

/// Per-request correlation id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionId(pub String);

impl TransactionId {
    /// Mint a fresh id from 16 random bytes.
    pub fn generate() -> Self {
        Self(URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes()))
    }

    /// Use the client's id when present, otherwise mint one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(&TRANSACTION_ID_HEADER_NAME)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or_else(Self::generate, |v| Self(v.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axum middleware that assigns, echoes and logs the transaction id.
pub async fn propagate(mut request: Request, next: Next) -> Response {
    let tid = TransactionId::from_headers(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    request.extensions_mut().insert(tid.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(tid.as_str()) {
        response
            .headers_mut()
            .insert(TRANSACTION_ID_HEADER_NAME.clone(), value);
    }

    let status = response.status();
    if status != StatusCode::NOT_FOUND && (status.is_client_error() || status.is_server_error()) {
        let detail = response
            .extensions()
            .get::<ErrorDetail>()
            .map_or("", |d| d.0.as_str());
        if status.is_server_error() {
            error!(tid = %tid, %method, path = %path, status = status.as_u16(), error = detail, "Request failed");
        } else {
            warn!(tid = %tid, %method, path = %path, status = status.as_u16(), error = detail, "Request rejected");
        }
    }

    response
}

//! Gateway error taxonomy and the JSON error encoder.
//!
//! Every failure that reaches the HTTP layer is a [`GatewayError`]. Each
//! variant carries a fixed status code:
//!
//! | Variant       | Status | Meaning                                           |
//! |---------------|--------|---------------------------------------------------|
//! | `BadRequest`  | 400    | malformed or incomplete command input             |
//! | `Unavailable` | 503    | upstream unreachable, timed out, or cancelled     |
//! | `Protocol`    | 500    | upstream answered 200 with an undecodable body    |
//! | `Internal`    | 500    | anything else that went wrong inside the gateway  |
//! | `Coded`       | any    | explicit status, e.g. 401/403 from inbound auth   |
//!
//! Error bodies are always `{"message": "<text>"}`. A 500 never exposes its
//! internal text; the client sees [`INTERNAL_ERROR_MESSAGE`] instead.

use std::fmt::Display;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Message sent to clients in place of any 500's internal error text.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// JSON content type used for every error body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// An error that knows which HTTP status it renders as.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Protocol(String),
    #[error("{0}")]
    Internal(String),
    #[error("{message}")]
    Coded { status: StatusCode, message: String },
}

impl GatewayError {
    pub fn bad_request(err: impl Display) -> Self {
        Self::BadRequest(err.to_string())
    }

    pub fn unavailable(err: impl Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn internal(err: impl Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn coded(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Coded {
            status,
            message: message.into(),
        }
    }

    /// HTTP status this error renders as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Protocol(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Coded { status, .. } => *status,
        }
    }

    /// Only an unreachable upstream is worth trying again.
    pub fn is_retryable(&self) -> bool {
        self.status_code() == StatusCode::SERVICE_UNAVAILABLE
    }

    /// Text safe to hand to the client.
    pub fn client_message(&self) -> String {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Internal error text attached to error responses so the transaction-id
/// middleware can log what actually happened without leaking it.
#[derive(Clone, Debug)]
pub struct ErrorDetail(pub String);

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(json!({ "message": self.client_message() }))).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );
        response.extensions_mut().insert(ErrorDetail(self.to_string()));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Protocol("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::coded(StatusCode::FORBIDDEN, "no").status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(GatewayError::unavailable("connection refused").is_retryable());
        assert!(!GatewayError::internal("boom").is_retryable());
        assert!(!GatewayError::bad_request("bad").is_retryable());
    }

    #[tokio::test]
    async fn test_bad_request_body_carries_message() {
        let response = GatewayError::bad_request("names parameter is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static(JSON_CONTENT_TYPE)
        );
        let body = body_json(response).await;
        assert_eq!(body["message"], "names parameter is required");
    }

    #[tokio::test]
    async fn test_internal_error_text_is_hidden() {
        let response = GatewayError::internal("db password is hunter2").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<ErrorDetail>().cloned().unwrap();
        assert!(detail.0.contains("hunter2"));
        let body = body_json(response).await;
        assert_eq!(body["message"], INTERNAL_ERROR_MESSAGE);
    }
}

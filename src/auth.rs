//! Inbound bearer-key authentication.
//!
//! When `[[auth.keys]]` are configured, every route except `/api/health`
//! requires `Authorization: Bearer <key>`. A matching key produces a
//! [`Principal`] request extension whose attributes carry the partner ids
//! the caller is allowed to act for.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};

use crate::config::ApiKeyConfig;
use crate::error::GatewayError;

/// JSON pointer to the partner list inside principal attributes.
const ALLOWED_PARTNERS_POINTER: &str = "/allowedResources/allowedPartners";

/// The authenticated caller.
#[derive(Clone, Debug)]
pub struct Principal {
    pub attributes: Value,
}

impl Principal {
    pub fn with_partners(partner_ids: &[String]) -> Self {
        Self {
            attributes: json!({ "allowedResources": { "allowedPartners": partner_ids } }),
        }
    }

    /// Partner ids granted to this principal, or `None` when the attribute
    /// is absent.
    pub fn allowed_partners(&self) -> Option<Vec<String>> {
        let partners = self.attributes.pointer(ALLOWED_PARTNERS_POINTER)?.as_array()?;
        Some(
            partners
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
        )
    }
}

/// Extension type carrying the configured keys, injected into the router
/// layer so [`require_api_key`] can reach them without touching `AppState`.
#[derive(Clone)]
pub struct ApiKeys(pub Arc<Vec<ApiKeyConfig>>);

/// Axum middleware that rejects requests without a known bearer key.
///
/// # Error responses
///
/// - `401 Unauthorized`: header missing or malformed
/// - `403 Forbidden`: key present but unknown
/// - `500 Internal Server Error`: [`ApiKeys`] extension not found (misconfiguration)
pub async fn require_api_key(mut request: Request, next: Next) -> Response {
    let Some(keys) = request.extensions().get::<ApiKeys>().cloned() else {
        return GatewayError::internal("api key extension missing").into_response();
    };

    let provided = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(p) => p.to_string(),
        None => {
            return GatewayError::coded(
                StatusCode::UNAUTHORIZED,
                "Missing or invalid Authorization header",
            )
            .into_response();
        }
    };

    let Some(entry) = keys
        .0
        .iter()
        .find(|k| constant_time_eq(k.key.as_bytes(), provided.as_bytes()))
    else {
        return GatewayError::coded(StatusCode::FORBIDDEN, "Invalid API key").into_response();
    };

    request
        .extensions_mut()
        .insert(Principal::with_partners(&entry.partner_ids));
    next.run(request).await
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
///
/// Always iterates over the full length of `expected` regardless of `provided`
/// length, so an attacker cannot determine the key length from response times.
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0xff);
        diff |= e ^ p;
    }
    diff == 0
}

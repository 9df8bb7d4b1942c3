//! Legacy `/api/v2/hook` registration shim.
//!
//! v2 clients were allowed to omit or overstate the registration lifetime.
//! Instead of rejecting those bodies, the shim rewrites them into something
//! the strict v3 handler accepts and tells the client via `X-Xmidt-Warning`:
//!
//! - neither `until` nor `duration` set: `duration` becomes `max_ttl`
//! - `duration` outside `[0, max_ttl]`: clamped to `max_ttl`
//! - `until` past `now + max_ttl + jitter`: `until` dropped, `duration = max_ttl`

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{check_duration, check_until, Registration, WebhookDuration};
use crate::config::WebhookConfig;
use crate::error::GatewayError;

pub const WARNING_HEADER: &str = "X-Xmidt-Warning";

static WARNING_HEADER_NAME: HeaderName = HeaderName::from_static("x-xmidt-warning");

/// Bring a legacy registration within limits. Returns the warnings to send
/// back, one per rewrite.
pub fn normalize(registration: &mut Registration, config: &WebhookConfig, now: DateTime<Utc>) -> Vec<String> {
    let max = WebhookDuration::from_std(config.max_ttl);
    let expiry = format!("Unless until is set, webhooks will expire after {max}");
    let mut warnings = Vec::new();

    if registration.until.is_none() && registration.duration.is_zero() {
        registration.duration = max;
        warnings.push(expiry.clone());
    }
    if check_duration(registration.duration, config).is_err() {
        registration.duration = max;
        warnings.push(format!(
            "Invalid duration will not be accepted in future releases. {expiry}"
        ));
    }
    if check_until(registration.until, config, now).is_err() {
        registration.until = None;
        registration.duration = max;
        warnings.push(format!(
            "Invalid until value will not be accepted in future releases. {expiry}"
        ));
    }
    warnings
}

/// Axum middleware rewriting the body of a v2 registration before the
/// registration handler sees it.
pub async fn fix_v2_duration(
    State(config): State<WebhookConfig>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let bytes = match body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return GatewayError::bad_request(format!("failed to read body: {e}")).into_response(),
    };

    let mut registration = match Registration::from_json(&bytes) {
        Ok(registration) => registration,
        Err(e) => return GatewayError::from(e).into_response(),
    };
    let warnings = normalize(&mut registration, &config, Utc::now());

    let rewritten = match serde_json::to_vec(&registration) {
        Ok(rewritten) => rewritten,
        Err(e) => return GatewayError::internal(e).into_response(),
    };
    if !warnings.is_empty() {
        debug!(url = %registration.config.url, ?warnings, "Rewrote legacy webhook lifetime");
    }
    parts.headers.remove(header::CONTENT_LENGTH);

    let mut response = next.run(Request::from_parts(parts, Body::from(rewritten))).await;
    for warning in warnings {
        if let Ok(value) = HeaderValue::from_str(&warning) {
            response
                .headers_mut()
                .append(WARNING_HEADER_NAME.clone(), value);
        }
    }
    response
}

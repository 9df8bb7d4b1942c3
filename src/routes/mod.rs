//! HTTP route handlers.
//!
//! Each sub-module corresponds to an API endpoint group. All handlers except
//! [`health`] require authentication via the [`crate::auth::require_api_key`]
//! middleware when `[[auth.keys]]` are configured.

pub mod health;
pub mod hooks;
pub mod stat;
pub mod translation;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::auth::{self, ApiKeys};
use crate::error::GatewayError;
use crate::tid;
use crate::webhook::v2;
use crate::AppState;

/// API versions served by the device routes.
const SUPPORTED_VERSIONS: [&str; 2] = ["v2", "v3"];

pub(crate) fn check_version(version: &str) -> Result<(), GatewayError> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(GatewayError::coded(
            StatusCode::NOT_FOUND,
            format!("unsupported API version {version:?}"),
        ))
    }
}

/// Assemble the full gateway router.
pub fn router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let public_routes = Router::new().route("/api/health", get(health::health));

    let mut api_routes = Router::new()
        .route("/api/{version}/device/{deviceid}/stat", get(stat::stat))
        .route(
            "/api/{version}/device/{deviceid}/{service}",
            get(translation::translate).patch(translation::translate),
        )
        .route(
            "/api/{version}/device/{deviceid}/{service}/{parameter}",
            post(translation::translate)
                .put(translation::translate)
                .delete(translation::translate),
        )
        .route("/api/v3/hook", post(hooks::register))
        .route(
            "/api/v2/hook",
            post(hooks::register).layer(middleware::from_fn_with_state(
                config.webhook,
                v2::fix_v2_duration,
            )),
        )
        .route("/api/{version}/hooks", get(hooks::list));

    if !config.auth.keys.is_empty() {
        api_routes = api_routes.route_layer(middleware::from_fn(auth::require_api_key));
    }

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(Extension(ApiKeys(Arc::new(config.auth.keys.clone()))))
        .layer(RequestBodyLimitLayer::new(config.server.max_body_size))
        .layer(middleware::from_fn(tid::propagate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

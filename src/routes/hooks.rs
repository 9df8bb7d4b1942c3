//! Webhook registration endpoints.
//!
//! `POST /api/v3/hook` validates strictly. `POST /api/v2/hook` runs through
//! [`crate::webhook::v2::fix_v2_duration`] first and then lands here too.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::webhook::{self, Registration};
use crate::AppState;

/// `POST /api/{v2,v3}/hook`: store a registration.
pub async fn register(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, GatewayError> {
    let registration = Registration::from_json(&body)?;
    let now = Utc::now();
    webhook::validate(&registration, &state.config.webhook, now)?;
    state.webhooks.register(registration, now).await;
    Ok(Json(json!({ "message": "Success" })))
}

/// `GET /api/{version}/hooks`: live registrations.
pub async fn list(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<Vec<Registration>>, GatewayError> {
    super::check_version(&version)?;
    Ok(Json(state.webhooks.list(Utc::now()).await))
}

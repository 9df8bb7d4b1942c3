//! Device statistics endpoint.

use axum::{
    extract::{Path, State},
    Extension,
};

use crate::error::GatewayError;
use crate::response::DecodedResponse;
use crate::tid::TransactionId;
use crate::AppState;

/// `GET /api/{version}/device/{deviceid}/stat`: forwarded to the cluster
/// as-is, answer passed through verbatim.
pub async fn stat(
    State(state): State<AppState>,
    Path((version, deviceid)): Path<(String, String)>,
    Extension(tid): Extension<TransactionId>,
) -> Result<DecodedResponse, GatewayError> {
    super::check_version(&version)?;
    state.stat.stat(&deviceid, &tid).await
}

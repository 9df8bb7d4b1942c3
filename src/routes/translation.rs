//! WDMP translation endpoints.
//!
//! | Method | Path                                                  | WDMP command                         |
//! |--------|-------------------------------------------------------|--------------------------------------|
//! | GET    | `/api/{v}/device/{deviceid}/{service}?names=..`       | `GET` / `GET_ATTRIBUTES`             |
//! | PATCH  | `/api/{v}/device/{deviceid}/{service}`                | `SET` / `SET_ATTRIBUTES` / `TEST_AND_SET` |
//! | DELETE | `/api/{v}/device/{deviceid}/{service}/{parameter}`    | `DELETE_ROW`                         |
//! | PUT    | `/api/{v}/device/{deviceid}/{service}/{parameter}`    | `REPLACE_ROWS`                       |
//! | POST   | `/api/{v}/device/{deviceid}/{service}/{parameter}`    | `ADD_ROW`                            |

use axum::{
    body,
    extract::{Path, Query, Request, State},
};

use crate::auth::Principal;
use crate::error::GatewayError;
use crate::pipeline::Inbound;
use crate::response::DecodedResponse;
use crate::tid::TransactionId;
use crate::wdmp::{PathVars, TranslationQuery};
use crate::AppState;

pub async fn translate(
    State(state): State<AppState>,
    Path(vars): Path<PathVars>,
    Query(query): Query<TranslationQuery>,
    request: Request,
) -> Result<DecodedResponse, GatewayError> {
    super::check_version(&vars.version)?;

    let (parts, body) = request.into_parts();
    let body = body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GatewayError::bad_request(format!("failed to read request body: {e}")))?;
    let tid = parts
        .extensions
        .get::<TransactionId>()
        .cloned()
        .unwrap_or_else(TransactionId::generate);

    state
        .translation
        .translate(Inbound {
            method: &parts.method,
            vars: &vars,
            query: &query,
            headers: &parts.headers,
            body: &body,
            tid: &tid,
            principal: parts.extensions.get::<Principal>(),
        })
        .await
}

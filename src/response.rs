//! Rendering cluster answers as HTTP responses.
//!
//! A non-200 from the cluster is the cluster's own failure and is passed
//! through untouched. A 200 carries a WRP message whose payload may report
//! the device's status as `{"statusCode": N}`; that status becomes the HTTP
//! status unless it is zero or 500. A device-side 500 stays a 200 so that a
//! 500 from this gateway always means the gateway failed.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{GatewayError, JSON_CONTENT_TYPE};
use crate::transactor::XmidtResponse;
use crate::wrp::Message;

/// Status, body and headers ready to be written to the client.
#[derive(Debug)]
pub struct DecodedResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub headers: HeaderMap,
}

impl IntoResponse for DecodedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }
}

#[derive(Deserialize)]
struct DeviceStatus {
    #[serde(rename = "statusCode")]
    status_code: i64,
}

/// Decode the cluster's answer to a translation request.
pub fn decode_translation(response: XmidtResponse) -> Result<DecodedResponse, GatewayError> {
    if response.code != StatusCode::OK {
        return Ok(passthrough(response));
    }

    let message = Message::decode(&response.body).map_err(|e| {
        GatewayError::Protocol(format!("undecodable WRP response from cluster: {e}"))
    })?;

    let mut headers = response.forwarded_headers;
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );

    Ok(DecodedResponse {
        status: device_status(&message.payload).unwrap_or(StatusCode::OK),
        body: Bytes::from(message.payload),
        headers,
    })
}

/// Stat answers are forwarded verbatim, whatever their status.
pub fn decode_stat(response: XmidtResponse) -> DecodedResponse {
    let mut decoded = passthrough(response);
    if decoded.status == StatusCode::OK {
        decoded.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );
    }
    decoded
}

fn passthrough(response: XmidtResponse) -> DecodedResponse {
    DecodedResponse {
        status: response.code,
        body: response.body,
        headers: response.forwarded_headers,
    }
}

/// Device status worth surfacing, if the payload reports one.
fn device_status(payload: &[u8]) -> Option<StatusCode> {
    let status: DeviceStatus = match serde_json::from_slice(payload) {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, "Device payload carries no readable statusCode");
            return None;
        }
    };
    if status.status_code == 0 || status.status_code == 500 {
        return None;
    }
    u16::try_from(status.status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
}

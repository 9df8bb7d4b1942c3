//! WRP envelope construction.

use axum::http::HeaderMap;

use crate::auth::Principal;
use crate::device_id::DeviceId;
use crate::error::GatewayError;
use crate::tid::TransactionId;
use crate::wdmp::{PathVars, WDMP_CONTENT_TYPE};
use crate::wrp::{Message, MessageType};

/// Comma-separated partner ids, consulted when the principal carries none.
pub const PARTNER_ID_HEADER: &str = "X-Xmidt-Partner-Id";

/// Resolve the caller's partner ids.
///
/// The authenticated principal's `allowedResources.allowedPartners` wins
/// when it lists at least one partner; otherwise the header is split on
/// commas, with blanks dropped.
pub fn partner_ids(principal: Option<&Principal>, headers: &HeaderMap) -> Vec<String> {
    if let Some(partners) = principal
        .and_then(Principal::allowed_partners)
        .filter(|p| !p.is_empty())
    {
        return partners;
    }

    headers
        .get_all(PARTNER_ID_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    wrp_source: String,
    partner_source: bool,
}

impl EnvelopeBuilder {
    pub fn new(wrp_source: impl Into<String>, partner_source: bool) -> Self {
        Self {
            wrp_source: wrp_source.into(),
            partner_source,
        }
    }

    /// Wrap a WDMP payload in a `SimpleRequestResponse` message addressed
    /// to `<canonical-device-id>/<service>`.
    pub fn build(
        &self,
        payload: Vec<u8>,
        tid: &TransactionId,
        vars: &PathVars,
        partner_ids: Vec<String>,
    ) -> Result<Message, GatewayError> {
        let device = DeviceId::parse(&vars.deviceid).map_err(GatewayError::bad_request)?;

        Ok(Message {
            message_type: MessageType::SimpleRequestResponse,
            source: self.source(&vars.service, &partner_ids),
            destination: format!("{device}/{}", vars.service),
            transaction_uuid: tid.as_str().to_string(),
            content_type: WDMP_CONTENT_TYPE.to_string(),
            partner_ids,
            payload,
        })
    }

    fn source(&self, service: &str, partner_ids: &[String]) -> String {
        match partner_ids.first() {
            Some(partner) if self.partner_source => {
                format!("{}/{partner}/{service}", self.wrp_source)
            }
            _ => format!("{}/{service}", self.wrp_source),
        }
    }
}

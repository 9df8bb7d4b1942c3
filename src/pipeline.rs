//! Per-endpoint request pipelines.
//!
//! [`StatService`] and [`TranslationService`] each hold the shared
//! [`Transactor`] and [`Acquirer`]; neither owns any per-request state.

use std::sync::Arc;

use axum::http::{header, HeaderMap, Method};
use tracing::{debug, instrument};

use crate::acquire::Acquirer;
use crate::auth::Principal;
use crate::config::XmidtConfig;
use crate::device_id::DeviceId;
use crate::envelope::{self, EnvelopeBuilder};
use crate::error::GatewayError;
use crate::response::{self, DecodedResponse};
use crate::tid::{TransactionId, TRANSACTION_ID_HEADER};
use crate::transactor::Transactor;
use crate::wdmp::{self, PathVars, TranslationQuery};
use crate::wrp::MSGPACK_CONTENT_TYPE;

async fn authorization(acquirer: &Acquirer) -> Result<String, GatewayError> {
    acquirer
        .acquire()
        .await
        .map_err(|e| GatewayError::internal(format!("failed to acquire outbound credentials: {e}")))
}

/// `GET /device/{deviceid}/stat`.
pub struct StatService {
    transactor: Arc<Transactor>,
    acquirer: Arc<Acquirer>,
    base_url: String,
}

impl StatService {
    pub fn new(config: &XmidtConfig, transactor: Arc<Transactor>, acquirer: Arc<Acquirer>) -> Self {
        Self {
            transactor,
            acquirer,
            base_url: config.url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self, tid), fields(tid = %tid))]
    pub async fn stat(&self, device_id: &str, tid: &TransactionId) -> Result<DecodedResponse, GatewayError> {
        let device = DeviceId::parse(device_id).map_err(GatewayError::bad_request)?;
        let url = format!("{}/api/v2/device/{device}/stat", self.base_url);

        let request = self
            .transactor
            .request(Method::GET, &url)
            .header(header::AUTHORIZATION, authorization(&self.acquirer).await?)
            .header(TRANSACTION_ID_HEADER, tid.as_str())
            .build()
            .map_err(GatewayError::internal)?;

        let answer = self.transactor.transact(request).await?;
        debug!(status = answer.code.as_u16(), "Stat answered");
        Ok(response::decode_stat(answer))
    }
}

/// Everything the translation pipeline reads from one inbound request.
pub struct Inbound<'a> {
    pub method: &'a Method,
    pub vars: &'a PathVars,
    pub query: &'a TranslationQuery,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
    pub tid: &'a TransactionId,
    pub principal: Option<&'a Principal>,
}

/// WDMP-over-WRP translation for `/device/{deviceid}/{service}[/{parameter}]`.
pub struct TranslationService {
    transactor: Arc<Transactor>,
    acquirer: Arc<Acquirer>,
    envelopes: EnvelopeBuilder,
    supported_services: Vec<String>,
    send_url: String,
}

impl TranslationService {
    pub fn new(config: &XmidtConfig, transactor: Arc<Transactor>, acquirer: Arc<Acquirer>) -> Self {
        Self {
            transactor,
            acquirer,
            envelopes: EnvelopeBuilder::new(config.wrp_source.clone(), config.partner_source),
            supported_services: config.supported_services.clone(),
            send_url: format!("{}/api/v2/device/send", config.url.trim_end_matches('/')),
        }
    }

    #[instrument(
        skip_all,
        fields(tid = %inbound.tid, device_id = %inbound.vars.deviceid, service = %inbound.vars.service)
    )]
    pub async fn translate(&self, inbound: Inbound<'_>) -> Result<DecodedResponse, GatewayError> {
        wdmp::check_service(&inbound.vars.service, &self.supported_services)?;
        let command = wdmp::decode(
            inbound.method,
            inbound.vars,
            inbound.query,
            inbound.headers,
            inbound.body,
        )?;
        debug!(command = command.name(), "Deduced WDMP command");

        let partner_ids = envelope::partner_ids(inbound.principal, inbound.headers);
        let message = self.envelopes.build(
            command.to_payload()?,
            inbound.tid,
            inbound.vars,
            partner_ids,
        )?;
        let body = message.encode().map_err(GatewayError::internal)?;

        let request = self
            .transactor
            .request(Method::POST, &self.send_url)
            .header(header::AUTHORIZATION, authorization(&self.acquirer).await?)
            .header(header::CONTENT_TYPE, MSGPACK_CONTENT_TYPE)
            .header(TRANSACTION_ID_HEADER, inbound.tid.as_str())
            .body(body)
            .build()
            .map_err(GatewayError::internal)?;

        let answer = self.transactor.transact(request).await?;
        debug!(status = answer.code.as_u16(), "Cluster answered");
        response::decode_translation(answer)
    }
}

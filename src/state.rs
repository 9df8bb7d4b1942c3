//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::acquire::{AcquireError, Acquirer};
use crate::config::Config;
use crate::error::GatewayError;
use crate::pipeline::{StatService, TranslationService};
use crate::transactor::Transactor;
use crate::webhook::WebhookRegistry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("acquirer: {0}")]
    Acquirer(#[from] AcquireError),
    #[error("transactor: {0}")]
    Transactor(#[from] GatewayError),
}

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Which outbound credential source is in use.
    pub acquirer_kind: &'static str,
    pub stat: Arc<StatService>,
    pub translation: Arc<TranslationService>,
    pub webhooks: Arc<WebhookRegistry>,
}

impl AppState {
    /// Build the outbound stack once; both pipelines share one transactor and
    /// one acquirer.
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let acquirer = Arc::new(Acquirer::from_config(&config.acquirer)?);
        let transactor = Arc::new(Transactor::new(&config.xmidt)?);

        Ok(Self {
            acquirer_kind: acquirer.kind(),
            stat: Arc::new(StatService::new(
                &config.xmidt,
                Arc::clone(&transactor),
                Arc::clone(&acquirer),
            )),
            translation: Arc::new(TranslationService::new(&config.xmidt, transactor, acquirer)),
            webhooks: Arc::new(WebhookRegistry::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }
}

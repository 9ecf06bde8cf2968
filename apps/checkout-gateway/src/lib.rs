//! ACP checkout gateway: the agent-facing HTTP surface.
//!
//! Wires the session repository, idempotency guard, and adapter contracts
//! into the five checkout-session operations.
pub mod adapters;
pub mod config;
pub mod handlers;
pub mod http;
pub mod telemetry;
pub mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};

use acp_core::{CatalogAdapter, PaymentProvider, WebhookSink};
use acp_idempotency::IdempotencyGuard;
use acp_kv::SharedKvStore;
use acp_session::SessionRepository;

use crate::adapters::{HttpCatalog, HttpPaymentProvider};
use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRepository,
    pub guard: IdempotencyGuard,
    pub catalog: Arc<dyn CatalogAdapter>,
    pub payments: Arc<dyn PaymentProvider>,
    pub webhooks: Arc<dyn WebhookSink>,
    pub config: GatewayConfig,
}

impl AppState {
    pub fn new(
        kv: SharedKvStore,
        catalog: Arc<dyn CatalogAdapter>,
        payments: Arc<dyn PaymentProvider>,
        webhooks: Arc<dyn WebhookSink>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            sessions: SessionRepository::new(kv.clone(), config.session_ttl),
            guard: IdempotencyGuard::new(kv, config.idempotency_ttl),
            catalog,
            payments,
            webhooks,
            config,
        }
    }
}

/// Builds the full state from the environment: KV backend, HTTP adapter
/// clients, and the outbound webhook sink.
pub async fn bootstrap(config: GatewayConfig) -> Result<AppState> {
    let kv = acp_kv::store_from_env().await?;
    let catalog_url = config
        .catalog_url
        .clone()
        .context("CATALOG_URL is required")?;
    let psp_url = config.psp_url.clone().context("PSP_URL is required")?;

    let client = reqwest::Client::new();
    let catalog: Arc<dyn CatalogAdapter> = Arc::new(HttpCatalog::new(client.clone(), &catalog_url)?);
    let payments: Arc<dyn PaymentProvider> = Arc::new(HttpPaymentProvider::new(client, &psp_url)?);
    let webhooks = webhook::sink_from_config(&config)?;

    Ok(AppState::new(kv, catalog, payments, webhooks, config))
}

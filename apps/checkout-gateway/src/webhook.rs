//! Outbound webhook delivery: sign the serialized event, POST it, bound it
//! with a timeout. The timestamp lives inside the signed payload so it stays
//! bound to the signature even if intermediaries strip headers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use acp_core::{OrderEvent, WebhookSink};
use acp_security::{merchant_signature_header, sign};

use crate::config::GatewayConfig;

pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

const BODY_SNIPPET_LIMIT: usize = 512;

pub struct SignedWebhookSender {
    client: Client,
    url: String,
    secret: String,
    signature_header: String,
}

impl SignedWebhookSender {
    pub fn new(
        url: String,
        secret: String,
        merchant_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        // The timeout aborts the in-flight request, freeing the connection.
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build webhook http client")?;
        Ok(Self {
            client,
            url,
            secret,
            signature_header: merchant_signature_header(merchant_name),
        })
    }
}

#[async_trait]
impl WebhookSink for SignedWebhookSender {
    async fn deliver(&self, event: &OrderEvent) -> Result<()> {
        let body = serde_json::to_vec(event).context("serialize webhook event")?;
        let signature = sign(&self.secret, event.timestamp, &body);

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header(self.signature_header.as_str(), signature)
            .header(TIMESTAMP_HEADER, event.timestamp.to_string())
            .body(body)
            .send()
            .await
            .context("webhook transport")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".into());
            let snippet: String = body.chars().take(BODY_SNIPPET_LIMIT).collect();
            anyhow::bail!("webhook endpoint returned {status}: {snippet}");
        }
        debug!(url = %self.url, kind = ?event.kind, "webhook delivered");
        Ok(())
    }
}

/// Logging no-op used when no endpoint is configured.
pub struct DisabledWebhookSink;

#[async_trait]
impl WebhookSink for DisabledWebhookSink {
    async fn deliver(&self, event: &OrderEvent) -> Result<()> {
        debug!(kind = ?event.kind, "webhook delivery disabled; event dropped");
        Ok(())
    }
}

pub fn sink_from_config(config: &GatewayConfig) -> Result<Arc<dyn WebhookSink>> {
    match (&config.webhook_url, &config.webhook_secret) {
        (Some(url), Some(secret)) => Ok(Arc::new(SignedWebhookSender::new(
            url.clone(),
            secret.clone(),
            &config.merchant_name,
            config.webhook_timeout,
        )?)),
        _ => {
            warn!("WEBHOOK_URL/WEBHOOK_SECRET not set; outbound webhooks disabled");
            Ok(Arc::new(DisabledWebhookSink))
        }
    }
}

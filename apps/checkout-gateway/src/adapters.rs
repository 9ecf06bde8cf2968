//! Thin HTTP clients for the external catalog and PSP collaborators. The
//! engine only ever sees the `acp_core` adapter traits; these are the
//! production wiring behind `CATALOG_URL` and `PSP_URL`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use acp_core::{
    CatalogAdapter, CheckoutSession, PaymentAuthorization, PaymentError, PaymentInput,
    PaymentProvider, PricingRequest, Quote,
};

const BODY_SNIPPET_LIMIT: usize = 512;

/// `POST {base}/price` with the cart; expects a quote back.
pub struct HttpCatalog {
    client: Client,
    base_url: Url,
}

impl HttpCatalog {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base_url: normalize_base(base_url)?,
        })
    }
}

#[async_trait]
impl CatalogAdapter for HttpCatalog {
    async fn price(&self, cart: &PricingRequest) -> Result<Quote> {
        let url = self.base_url.join("price").context("catalog price endpoint")?;
        let response = self
            .client
            .post(url)
            .json(cart)
            .send()
            .await
            .context("catalog transport")?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".into());
            anyhow::bail!("catalog returned {status}: {}", snippet(&body));
        }
        response.json::<Quote>().await.context("decode catalog quote")
    }
}

#[derive(Serialize)]
struct AuthorizeBody<'a> {
    session: &'a CheckoutSession,
    payment: &'a PaymentInput,
}

#[derive(Debug, Deserialize)]
struct AuthorizeReply {
    approved: bool,
    #[serde(default)]
    intent_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptureReply {
    captured: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// `POST {base}/authorize` and `POST {base}/capture/{intent}`.
pub struct HttpPaymentProvider {
    client: Client,
    base_url: Url,
}

impl HttpPaymentProvider {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base_url: normalize_base(base_url)?,
        })
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn authorize(
        &self,
        session: &CheckoutSession,
        payment: &PaymentInput,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let url = self
            .base_url
            .join("authorize")
            .map_err(|err| PaymentError::Transport(err.into()))?;
        let response = self
            .client
            .post(url)
            .json(&AuthorizeBody { session, payment })
            .send()
            .await
            .map_err(|err| PaymentError::Transport(err.into()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".into());
            return Err(PaymentError::Transport(anyhow::anyhow!(
                "psp authorize returned {status}: {}",
                snippet(&body)
            )));
        }
        let reply: AuthorizeReply = response
            .json()
            .await
            .map_err(|err| PaymentError::Transport(err.into()))?;
        if !reply.approved {
            return Err(PaymentError::Declined(
                reply.reason.unwrap_or_else(|| "payment declined".into()),
            ));
        }
        reply
            .intent_id
            .map(|intent_id| PaymentAuthorization { intent_id })
            .ok_or_else(|| {
                PaymentError::Transport(anyhow::anyhow!("psp approved without an intent id"))
            })
    }

    async fn capture(&self, intent_id: &str) -> Result<(), PaymentError> {
        let url = self
            .base_url
            .join(&format!("capture/{intent_id}"))
            .map_err(|err| PaymentError::Transport(err.into()))?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|err| PaymentError::Transport(err.into()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".into());
            return Err(PaymentError::Transport(anyhow::anyhow!(
                "psp capture returned {status}: {}",
                snippet(&body)
            )));
        }
        let reply: CaptureReply = response
            .json()
            .await
            .map_err(|err| PaymentError::Transport(err.into()))?;
        if !reply.captured {
            return Err(PaymentError::Declined(
                reply.reason.unwrap_or_else(|| "capture refused".into()),
            ));
        }
        Ok(())
    }
}

fn normalize_base(base_url: &str) -> Result<Url> {
    // A trailing slash keeps the base path intact when joining endpoints.
    if base_url.ends_with('/') {
        Url::parse(base_url).context("invalid adapter base url")
    } else {
        Url::parse(&format!("{base_url}/")).context("invalid adapter base url")
    }
}

fn snippet(body: &str) -> String {
    if body.chars().count() > BODY_SNIPPET_LIMIT {
        body.chars().take(BODY_SNIPPET_LIMIT).collect()
    } else {
        body.to_string()
    }
}

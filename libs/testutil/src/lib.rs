//! Scripted adapter doubles for tests: a fixed-price catalog, a PSP with
//! programmable outcomes, and a webhook sink that records every delivery.
//! Call counters back the at-most-once assertions in the gateway tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use acp_core::{
    CatalogAdapter, CheckoutSession, Fulfillment, LineItem, Money, OrderEvent,
    PaymentAuthorization, PaymentError, PaymentInput, PaymentProvider, PricingRequest, Quote,
    SessionMessage, Totals, WebhookSink,
};

/// Prices every cart line at one fixed unit price.
pub struct StubCatalog {
    pub unit_price: i64,
    pub currency: String,
    ready: AtomicBool,
    fail: AtomicBool,
    calls: AtomicUsize,
    pub fulfillment: Mutex<Option<Fulfillment>>,
    pub messages: Mutex<Vec<SessionMessage>>,
}

impl StubCatalog {
    pub fn new(unit_price: i64, currency: &str) -> Self {
        Self {
            unit_price,
            currency: currency.to_string(),
            ready: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            fulfillment: Mutex::new(None),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Controls the quote's `ready` flag for subsequent calls.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Makes subsequent pricing calls fail at the transport level.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogAdapter for StubCatalog {
    async fn price(&self, cart: &PricingRequest) -> Result<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("catalog unavailable");
        }

        let unit = Money::new(self.unit_price, &self.currency);
        let items: Vec<LineItem> = cart
            .items
            .iter()
            .map(|item| LineItem {
                id: item.id.clone(),
                title: format!("Item {}", item.id),
                quantity: item.quantity,
                unit_price: unit.clone(),
                variant_id: None,
                sku: None,
                image_url: None,
            })
            .collect();

        let mut subtotal = Money::zero(&self.currency);
        for item in &items {
            subtotal = subtotal.add(&item.unit_price.times(item.quantity))?;
        }

        let mut fulfillment = self.fulfillment.lock().await.clone();
        if let (Some(f), Some(input)) = (fulfillment.as_mut(), cart.fulfillment.as_ref()) {
            if input.selected_id.is_some() {
                f.selected_id = input.selected_id.clone();
            }
        }

        Ok(Quote {
            items,
            totals: Totals::from_components(subtotal, None, None, None)?,
            fulfillment,
            messages: self.messages.lock().await.clone(),
            ready: self.ready.load(Ordering::SeqCst),
        })
    }
}

/// PSP double with programmable authorize/capture outcomes.
pub struct StubPaymentProvider {
    pub intent_id: String,
    decline_authorize: Mutex<Option<String>>,
    decline_capture: Mutex<Option<String>>,
    authorize_calls: AtomicUsize,
    capture_calls: AtomicUsize,
}

impl StubPaymentProvider {
    pub fn new(intent_id: &str) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            decline_authorize: Mutex::new(None),
            decline_capture: Mutex::new(None),
            authorize_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
        }
    }

    pub async fn decline_authorize(&self, reason: &str) {
        *self.decline_authorize.lock().await = Some(reason.to_string());
    }

    pub async fn decline_capture(&self, reason: &str) {
        *self.decline_capture.lock().await = Some(reason.to_string());
    }

    pub fn authorize_count(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for StubPaymentProvider {
    async fn authorize(
        &self,
        _session: &CheckoutSession,
        _payment: &PaymentInput,
    ) -> Result<PaymentAuthorization, PaymentError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.decline_authorize.lock().await.clone() {
            return Err(PaymentError::Declined(reason));
        }
        Ok(PaymentAuthorization {
            intent_id: self.intent_id.clone(),
        })
    }

    async fn capture(&self, _intent_id: &str) -> Result<(), PaymentError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.decline_capture.lock().await.clone() {
            return Err(PaymentError::Declined(reason));
        }
        Ok(())
    }
}

/// Webhook sink that records deliveries instead of POSTing them.
pub struct RecordingWebhookSink {
    pub events: Mutex<Vec<OrderEvent>>,
    fail: AtomicBool,
}

impl RecordingWebhookSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn delivered(&self) -> Vec<OrderEvent> {
        self.events.lock().await.clone()
    }
}

impl Default for RecordingWebhookSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSink for RecordingWebhookSink {
    async fn deliver(&self, event: &OrderEvent) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("webhook endpoint unavailable");
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_core::ItemInput;

    #[tokio::test]
    async fn stub_catalog_prices_and_counts() {
        let catalog = StubCatalog::new(1000, "USD");
        let quote = catalog
            .price(&PricingRequest {
                items: vec![
                    ItemInput {
                        id: "prod-1".into(),
                        quantity: 2,
                    },
                    ItemInput {
                        id: "prod-2".into(),
                        quantity: 1,
                    },
                ],
                customer: None,
                fulfillment: None,
            })
            .await
            .unwrap();
        assert_eq!(quote.totals.grand_total.amount, 3000);
        assert!(quote.ready);
        quote.verify().unwrap();
        assert_eq!(catalog.call_count(), 1);
    }

    #[tokio::test]
    async fn stub_psp_scripts_declines() {
        let psp = StubPaymentProvider::new("pi_T");
        psp.decline_authorize("Card declined").await;
        let session_err = psp
            .authorize(
                &placeholder_session(),
                &PaymentInput {
                    delegated_token: Some("tok".into()),
                    method: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(session_err, PaymentError::Declined(reason) if reason == "Card declined"));
        assert_eq!(psp.authorize_count(), 1);
        assert_eq!(psp.capture_count(), 0);
    }

    fn placeholder_session() -> CheckoutSession {
        let unit = Money::new(1000, "USD");
        CheckoutSession {
            id: "cs_1".into(),
            status: acp_core::SessionStatus::ReadyForPayment,
            items: vec![LineItem {
                id: "prod-1".into(),
                title: "Item prod-1".into(),
                quantity: 1,
                unit_price: unit.clone(),
                variant_id: None,
                sku: None,
                image_url: None,
            }],
            totals: Totals::from_components(unit, None, None, None).unwrap(),
            fulfillment: None,
            customer: None,
            messages: Vec::new(),
            links: Vec::new(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        }
    }
}

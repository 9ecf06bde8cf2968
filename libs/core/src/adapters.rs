//! Contracts for the external collaborators the checkout engine drives:
//! catalog pricing, payment authorization/capture, and the outbound webhook
//! sink. The engine depends only on these traits, never on a backend.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::requests::{FulfillmentInput, ItemInput, PaymentInput};
use crate::types::{
    CheckoutSession, Customer, Fulfillment, LineItem, Order, SessionMessage, Totals, unix_now,
};

/// Cart snapshot sent to the catalog for pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRequest {
    pub items: Vec<ItemInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<FulfillmentInput>,
}

/// Catalog output: priced items, totals, fulfillment, advisories, and
/// whether the cart can be paid for as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub items: Vec<LineItem>,
    pub totals: Totals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<SessionMessage>,
    pub ready: bool,
}

impl Quote {
    /// Refuses quotes that would break session invariants if persisted.
    pub fn verify(&self) -> Result<()> {
        anyhow::ensure!(!self.items.is_empty(), "quote has no line items");
        let currency = &self.totals.subtotal.currency;
        for (idx, item) in self.items.iter().enumerate() {
            anyhow::ensure!(item.quantity > 0, "line item {idx} has zero quantity");
            anyhow::ensure!(
                &item.unit_price.currency == currency,
                "line item {idx} priced in {} but totals use {currency}",
                item.unit_price.currency
            );
        }
        self.totals.verify()?;
        if let Some(fulfillment) = &self.fulfillment {
            anyhow::ensure!(
                fulfillment.selection_valid(),
                "fulfillment selected_id does not match any option"
            );
        }
        Ok(())
    }
}

#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Prices the cart and reports whether it is ready for payment.
    async fn price(&self, cart: &PricingRequest) -> Result<Quote>;
}

/// PSP-scoped identifier for an authorized payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    pub intent_id: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The provider rejected the payment; the reason is surfaced to the agent.
    #[error("{0}")]
    Declined(String),
    #[error("payment provider transport error")]
    Transport(#[source] anyhow::Error),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn authorize(
        &self,
        session: &CheckoutSession,
        payment: &PaymentInput,
    ) -> Result<PaymentAuthorization, PaymentError>;

    /// Captures a previously authorized intent. The provider voids
    /// authorizations that are never captured.
    async fn capture(&self, intent_id: &str) -> Result<(), PaymentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    OrderCreated,
    OrderUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEventData {
    #[serde(rename = "type")]
    pub kind: String,
    pub checkout_session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink_url: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunds: Option<serde_json::Value>,
}

/// Outbound order lifecycle event. The timestamp travels inside the payload
/// so it stays bound to the signature even if headers are stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub kind: OrderEventKind,
    pub data: OrderEventData,
    pub timestamp: i64,
}

impl OrderEvent {
    /// Emitted when a completed checkout places its order.
    pub fn order_created(session: &CheckoutSession, order: &Order) -> Self {
        OrderEvent {
            kind: OrderEventKind::OrderCreated,
            data: OrderEventData {
                kind: "order".into(),
                checkout_session_id: session.id.clone(),
                permalink_url: order.permalink_url.clone(),
                status: session.status.as_str().into(),
                refunds: None,
            },
            timestamp: unix_now(),
        }
    }

    /// Emitted on cancellation and other post-terminal updates.
    pub fn order_updated(session: &CheckoutSession) -> Self {
        OrderEvent {
            kind: OrderEventKind::OrderUpdated,
            data: OrderEventData {
                kind: "order".into(),
                checkout_session_id: session.id.clone(),
                permalink_url: None,
                status: session.status.as_str().into(),
                refunds: None,
            },
            timestamp: unix_now(),
        }
    }
}

#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Delivers an event at-least-once; receivers tolerate duplicates.
    async fn deliver(&self, event: &OrderEvent) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FulfillmentChoice, Money};

    fn quote(ready: bool) -> Quote {
        let unit = Money::new(1000, "USD");
        Quote {
            items: vec![LineItem {
                id: "prod-1".into(),
                title: "Widget".into(),
                quantity: 2,
                unit_price: unit.clone(),
                variant_id: None,
                sku: None,
                image_url: None,
            }],
            totals: Totals::from_components(Money::new(2000, "USD"), None, None, None).unwrap(),
            fulfillment: None,
            messages: Vec::new(),
            ready,
        }
    }

    #[test]
    fn consistent_quote_passes() {
        quote(true).verify().unwrap();
    }

    #[test]
    fn empty_quote_is_rejected() {
        let mut q = quote(true);
        q.items.clear();
        assert!(q.verify().is_err());
    }

    #[test]
    fn mixed_currency_quote_is_rejected() {
        let mut q = quote(true);
        q.items[0].unit_price.currency = "EUR".into();
        assert!(q.verify().is_err());
    }

    #[test]
    fn dangling_fulfillment_selection_is_rejected() {
        let mut q = quote(true);
        q.fulfillment = Some(Fulfillment {
            options: vec![FulfillmentChoice {
                id: "standard".into(),
                label: "Standard".into(),
                price: Money::new(0, "USD"),
                est_delivery: None,
            }],
            selected_id: Some("overnight".into()),
        });
        assert!(q.verify().is_err());
    }

    #[test]
    fn order_event_wire_shape() {
        let session = CheckoutSession {
            id: "cs_1".into(),
            status: crate::types::SessionStatus::Completed,
            items: quote(true).items,
            totals: quote(true).totals,
            fulfillment: None,
            customer: None,
            messages: Vec::new(),
            links: Vec::new(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };
        let order = Order {
            id: "pi_1".into(),
            checkout_session_id: "cs_1".into(),
            status: crate::types::OrderStatus::Placed,
            permalink_url: None,
        };
        let value = serde_json::to_value(OrderEvent::order_created(&session, &order)).unwrap();
        assert_eq!(value["type"], "order_created");
        assert_eq!(value["data"]["type"], "order");
        assert_eq!(value["data"]["checkout_session_id"], "cs_1");
        assert_eq!(value["data"]["status"], "completed");
        assert!(value["timestamp"].is_i64());
    }
}

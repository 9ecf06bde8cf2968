use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Returns the current UTC instant as an RFC-3339 string.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".into())
}

/// Returns the current UTC instant as UNIX seconds.
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// An amount of money in minor units of a single currency.
///
/// ```
/// use acp_core::Money;
///
/// let price = Money::new(1000, "USD");
/// assert_eq!(price.times(3).amount, 3000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
    #[error("grand total {actual} does not match component sum {expected}")]
    GrandTotalMismatch { expected: i64, actual: i64 },
}

impl Money {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(0, currency)
    }

    /// Adds two amounts of the same currency.
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency.clone()))
    }

    /// Subtracts an amount of the same currency.
    pub fn sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency.clone()))
    }

    /// Multiplies by a line quantity.
    pub fn times(&self, quantity: u32) -> Money {
        Money::new(self.amount * i64::from(quantity), self.currency.clone())
    }

    fn ensure_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }
}

/// Postal address attached to a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Billing and shipping addresses supplied by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
}

/// A priced cart line. The extended amount is never stored; it is always
/// `quantity * unit_price` recomputed from these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Order totals. `grand_total` is authoritative and must equal
/// `subtotal + tax + shipping - discount` with absent components as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<Money>,
    pub grand_total: Money,
}

impl Totals {
    /// Builds totals from components, computing the grand total.
    pub fn from_components(
        subtotal: Money,
        tax: Option<Money>,
        shipping: Option<Money>,
        discount: Option<Money>,
    ) -> Result<Totals, MoneyError> {
        let mut grand_total = subtotal.clone();
        for part in [&tax, &shipping] {
            if let Some(money) = part {
                grand_total = grand_total.add(money)?;
            }
        }
        if let Some(money) = &discount {
            grand_total = grand_total.sub(money)?;
        }
        Ok(Totals {
            subtotal,
            tax,
            shipping,
            discount,
            grand_total,
        })
    }

    /// Checks the grand-total equation and single-currency invariant.
    pub fn verify(&self) -> Result<(), MoneyError> {
        let mut expected = self.subtotal.clone();
        for part in [&self.tax, &self.shipping] {
            if let Some(money) = part {
                expected = expected.add(money)?;
            }
        }
        if let Some(money) = &self.discount {
            expected = expected.sub(money)?;
        }
        expected.ensure_currency(&self.grand_total)?;
        if expected.amount != self.grand_total.amount {
            return Err(MoneyError::GrandTotalMismatch {
                expected: expected.amount,
                actual: self.grand_total.amount,
            });
        }
        Ok(())
    }
}

/// One way the order can be fulfilled, as priced by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentChoice {
    pub id: String,
    pub label: String,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_delivery: Option<DeliveryWindow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
}

/// Fulfillment options offered to the agent plus its current selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FulfillmentChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_id: Option<String>,
}

impl Fulfillment {
    /// `selected_id`, when present, must name one of the offered options.
    pub fn selection_valid(&self) -> bool {
        match &self.selected_id {
            Some(selected) => self.options.iter().any(|opt| &opt.id == selected),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// Advisory text surfaced to the agent alongside the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// Link surfaced with the session (terms, policies, and the like).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Checkout session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotReadyForPayment,
    ReadyForPayment,
    Completed,
    Canceled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotReadyForPayment => "not_ready_for_payment",
            SessionStatus::ReadyForPayment => "ready_for_payment",
            SessionStatus::Completed => "completed",
            SessionStatus::Canceled => "canceled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Canceled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The primary entity: one agent-driven purchase in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub status: SessionStatus,
    pub items: Vec<LineItem>,
    pub totals: Totals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<SessionMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    pub created_at: String,
    pub updated_at: String,
}

impl CheckoutSession {
    /// Server-generated opaque session identifier.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Failed,
    Refunded,
}

/// Created on successful completion; the id is the PSP's payment intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub checkout_session_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink_url: Option<String>,
}

/// `complete` response payload: the finished session with its order embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedCheckout {
    #[serde(flatten)]
    pub session: CheckoutSession,
    pub order: Order,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(amount: i64) -> Money {
        Money::new(amount, "USD")
    }

    #[test]
    fn money_rejects_mixed_currencies() {
        let err = usd(100).add(&Money::new(100, "EUR")).unwrap_err();
        assert_eq!(
            err,
            MoneyError::CurrencyMismatch {
                left: "USD".into(),
                right: "EUR".into(),
            }
        );
    }

    #[test]
    fn totals_verify_accepts_consistent_components() {
        let totals = Totals::from_components(
            usd(3000),
            Some(usd(300)),
            Some(usd(500)),
            Some(usd(200)),
        )
        .unwrap();
        assert_eq!(totals.grand_total.amount, 3600);
        totals.verify().unwrap();
    }

    #[test]
    fn totals_verify_rejects_wrong_grand_total() {
        let mut totals = Totals::from_components(usd(3000), None, None, None).unwrap();
        totals.grand_total.amount = 2999;
        assert_eq!(
            totals.verify().unwrap_err(),
            MoneyError::GrandTotalMismatch {
                expected: 3000,
                actual: 2999,
            }
        );
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::ReadyForPayment).unwrap();
        assert_eq!(json, "\"ready_for_payment\"");
        let parsed: SessionStatus = serde_json::from_str("\"not_ready_for_payment\"").unwrap();
        assert_eq!(parsed, SessionStatus::NotReadyForPayment);
    }

    #[test]
    fn fulfillment_selection_must_match_an_option() {
        let fulfillment = Fulfillment {
            options: vec![FulfillmentChoice {
                id: "standard".into(),
                label: "Standard".into(),
                price: usd(500),
                est_delivery: None,
            }],
            selected_id: Some("express".into()),
        };
        assert!(!fulfillment.selection_valid());
    }

    #[test]
    fn completed_checkout_flattens_session_fields() {
        let session = CheckoutSession {
            id: "cs_1".into(),
            status: SessionStatus::Completed,
            items: vec![LineItem {
                id: "prod-1".into(),
                title: "Widget".into(),
                quantity: 1,
                unit_price: usd(1000),
                variant_id: None,
                sku: None,
                image_url: None,
            }],
            totals: Totals::from_components(usd(1000), None, None, None).unwrap(),
            fulfillment: None,
            customer: None,
            messages: Vec::new(),
            links: Vec::new(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };
        let completed = CompletedCheckout {
            session,
            order: Order {
                id: "pi_1".into(),
                checkout_session_id: "cs_1".into(),
                status: OrderStatus::Placed,
                permalink_url: None,
            },
        };
        let value = serde_json::to_value(&completed).unwrap();
        assert_eq!(value["id"], "cs_1");
        assert_eq!(value["order"]["id"], "pi_1");
        assert_eq!(value["order"]["status"], "placed");
    }
}

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Address, Customer};

/// A cart line as the agent sends it; pricing comes from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    pub id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub items: Vec<ItemInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<FulfillmentInput>,
}

/// Same shape as create with every field optional; at least one must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCheckoutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<FulfillmentInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteCheckoutRequest {
    pub payment: PaymentInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<FulfillmentInput>,
}

/// Opaque payment handle; the server never sees card data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Parses a request body, separating syntax errors from shape errors.
pub fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|_| ProtocolError::InvalidJson)?;
    serde_json::from_value(value).map_err(|err| ProtocolError::Validation {
        param: None,
        message: format!("malformed request body: {err}"),
    })
}

impl CreateCheckoutRequest {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        validate_items(&self.items)?;
        if let Some(customer) = &self.customer {
            validate_customer(customer)?;
        }
        Ok(())
    }
}

impl UpdateCheckoutRequest {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.items.is_none() && self.customer.is_none() && self.fulfillment.is_none() {
            return Err(ProtocolError::validation_bare(
                "at least one of items, customer, or fulfillment must be provided",
            ));
        }
        if let Some(items) = &self.items {
            validate_items(items)?;
        }
        if let Some(customer) = &self.customer {
            validate_customer(customer)?;
        }
        Ok(())
    }
}

impl CompleteCheckoutRequest {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let has_token = self
            .payment
            .delegated_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty());
        let has_method = self
            .payment
            .method
            .as_deref()
            .is_some_and(|method| !method.trim().is_empty());
        if !has_token && !has_method {
            return Err(ProtocolError::validation(
                "payment",
                "payment requires a delegated_token or a method",
            ));
        }
        if let Some(customer) = &self.customer {
            validate_customer(customer)?;
        }
        Ok(())
    }
}

fn validate_items(items: &[ItemInput]) -> Result<(), ProtocolError> {
    if items.is_empty() {
        return Err(ProtocolError::validation(
            "items",
            "at least one item is required",
        ));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.id.trim().is_empty() {
            return Err(ProtocolError::validation(
                format!("items[{idx}].id"),
                "item id must be a non-empty string",
            ));
        }
        if item.quantity == 0 {
            return Err(ProtocolError::validation(
                format!("items[{idx}].quantity"),
                "quantity must be a positive integer",
            ));
        }
    }
    Ok(())
}

fn validate_customer(customer: &Customer) -> Result<(), ProtocolError> {
    if let Some(address) = &customer.billing_address {
        validate_address("customer.billing_address", address)?;
    }
    if let Some(address) = &customer.shipping_address {
        validate_address("customer.shipping_address", address)?;
    }
    Ok(())
}

fn validate_address(path: &str, address: &Address) -> Result<(), ProtocolError> {
    if address.line1.trim().is_empty() {
        return Err(ProtocolError::validation(
            format!("{path}.line1"),
            "line1 is required",
        ));
    }
    if address.city.trim().is_empty() {
        return Err(ProtocolError::validation(
            format!("{path}.city"),
            "city is required",
        ));
    }
    if address.postal_code.trim().is_empty() {
        return Err(ProtocolError::validation(
            format!("{path}.postal_code"),
            "postal_code is required",
        ));
    }
    if address.country.len() != 2 || !address.country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ProtocolError::validation(
            format!("{path}.country"),
            "country must be a 2-letter code",
        ));
    }
    Ok(())
}

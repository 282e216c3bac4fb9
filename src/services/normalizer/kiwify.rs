//! Kiwify order webhook mapping.
//!
//! Kiwify reports amounts in cents (`Commissions.charge_amount`) and uses
//! capitalized section names.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::{
    ParseError, RawAmount, currency_amount, id_to_string, optional, parse_timestamp,
    payment_method_label, required,
};
use crate::models::{
    purchase::{Buyer, PurchaseEvent, PurchaseStatus},
    tenant::Platform,
};

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    order_id: Option<String>,
    order_status: String,
    #[serde(default)]
    webhook_event_type: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    approved_date: Option<String>,
    #[serde(rename = "Product")]
    product: ProductData,
    #[serde(rename = "Customer")]
    customer: CustomerData,
    #[serde(rename = "Commissions")]
    commissions: Commissions,
}

#[derive(Debug, Deserialize)]
struct ProductData {
    #[serde(default)]
    product_id: Option<Value>,
    #[serde(default)]
    product_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerData {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    mobile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Commissions {
    charge_amount: RawAmount,
    #[serde(default)]
    currency: Option<String>,
}

fn status_for(order_status: &str) -> Result<PurchaseStatus, ParseError> {
    match order_status {
        "paid" | "approved" => Ok(PurchaseStatus::Approved),
        "refunded" => Ok(PurchaseStatus::Refunded),
        "chargedback" => Ok(PurchaseStatus::Chargeback),
        "canceled" => Ok(PurchaseStatus::Canceled),
        "refused" | "waiting_payment" | "processing" => Ok(PurchaseStatus::Pending),
        other => Err(ParseError::UnsupportedEvent(other.to_string())),
    }
}

pub(super) fn normalize(payload: &Value) -> Result<PurchaseEvent, ParseError> {
    let parsed = Payload::deserialize(payload).map_err(|e| ParseError::Schema {
        platform: Platform::Kiwify,
        reason: e.to_string(),
    })?;

    let order_status = parsed.order_status.trim().to_ascii_lowercase();
    let status = status_for(&order_status)?;
    let event_type = optional(parsed.webhook_event_type).unwrap_or(order_status);

    let transaction_id = required(parsed.order_id.as_deref(), "order_id")?;
    let cents = parsed
        .commissions
        .charge_amount
        .to_decimal("Commissions.charge_amount")?;
    let amount = currency_amount(cents / Decimal::ONE_HUNDRED, "Commissions.charge_amount")?;

    let occurred_at = parse_timestamp(parsed.approved_date.as_deref())
        .filter(|_| status == PurchaseStatus::Approved)
        .or_else(|| parse_timestamp(parsed.created_at.as_deref()))
        .unwrap_or_else(Utc::now);

    Ok(PurchaseEvent {
        platform: Platform::Kiwify,
        transaction_id,
        event_type,
        buyer: Buyer {
            name: required(parsed.customer.full_name.as_deref(), "Customer.full_name")?,
            email: optional(parsed.customer.email).map(|e| e.to_lowercase()),
            phone: optional(parsed.customer.mobile),
        },
        product_id: id_to_string(parsed.product.product_id.as_ref()),
        product_name: required(parsed.product.product_name.as_deref(), "Product.product_name")?,
        amount,
        currency: optional(parsed.commissions.currency).unwrap_or_else(|| "BRL".to_string()),
        payment_method: parsed
            .payment_method
            .map(|method| payment_method_label(&method)),
        status,
        occurred_at,
    })
}

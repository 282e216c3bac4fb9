//! Hotmart webhook (v2.0.0) mapping.
//!
//! ```json
//! {
//!   "id": "6f3ab9f2-...",
//!   "creation_date": 1700000000000,
//!   "event": "PURCHASE_APPROVED",
//!   "data": {
//!     "product": { "id": 123, "name": "Curso X" },
//!     "buyer": { "name": "Maria", "email": "maria@example.com", "checkout_phone": "5511..." },
//!     "purchase": {
//!       "transaction": "HP1234567890",
//!       "approved_date": 1700000000000,
//!       "price": { "value": 297.0, "currency_value": "BRL" },
//!       "payment": { "type": "CREDIT_CARD" }
//!     }
//!   }
//! }
//! ```

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::{
    ParseError, RawAmount, currency_amount, from_epoch_millis, id_to_string, optional,
    payment_method_label, required,
};
use crate::models::{
    purchase::{Buyer, PurchaseEvent, PurchaseStatus},
    tenant::Platform,
};

#[derive(Debug, Deserialize)]
struct Payload {
    event: String,
    #[serde(default)]
    creation_date: Option<i64>,
    data: Data,
}

#[derive(Debug, Deserialize)]
struct Data {
    buyer: BuyerData,
    product: ProductData,
    purchase: PurchaseData,
}

#[derive(Debug, Deserialize)]
struct BuyerData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "phone")]
    checkout_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductData {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PurchaseData {
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    approved_date: Option<i64>,
    price: Price,
    #[serde(default)]
    payment: Option<Payment>,
}

#[derive(Debug, Deserialize)]
struct Price {
    value: RawAmount,
    #[serde(default, alias = "currency_value")]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Payment {
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

fn status_for(event: &str) -> Result<PurchaseStatus, ParseError> {
    match event {
        "PURCHASE_APPROVED" | "PURCHASE_COMPLETE" => Ok(PurchaseStatus::Approved),
        "PURCHASE_REFUNDED" => Ok(PurchaseStatus::Refunded),
        "PURCHASE_CANCELED" => Ok(PurchaseStatus::Canceled),
        "PURCHASE_CHARGEBACK" | "PURCHASE_PROTEST" => Ok(PurchaseStatus::Chargeback),
        "PURCHASE_BILLET_PRINTED" | "PURCHASE_DELAYED" | "PURCHASE_EXPIRED"
        | "WAITING_PAYMENT" => Ok(PurchaseStatus::Pending),
        other => Err(ParseError::UnsupportedEvent(other.to_string())),
    }
}

pub(super) fn normalize(payload: &Value) -> Result<PurchaseEvent, ParseError> {
    let parsed = Payload::deserialize(payload).map_err(|e| ParseError::Schema {
        platform: Platform::Hotmart,
        reason: e.to_string(),
    })?;

    let event_type = parsed.event.trim().to_string();
    let status = status_for(&event_type)?;

    let Data {
        buyer,
        product,
        purchase,
    } = parsed.data;

    let transaction_id = required(purchase.transaction.as_deref(), "purchase.transaction")?;
    let amount = purchase.price.value.to_decimal("purchase.price.value")?;
    let amount = currency_amount(amount, "purchase.price.value")?;

    let occurred_at = from_epoch_millis(purchase.approved_date)
        .filter(|_| status == PurchaseStatus::Approved)
        .or_else(|| from_epoch_millis(parsed.creation_date))
        .unwrap_or_else(Utc::now);

    Ok(PurchaseEvent {
        platform: Platform::Hotmart,
        transaction_id,
        event_type,
        buyer: Buyer {
            name: required(buyer.name.as_deref(), "buyer.name")?,
            email: optional(buyer.email).map(|e| e.to_lowercase()),
            phone: optional(buyer.checkout_phone),
        },
        product_id: id_to_string(product.id.as_ref()),
        product_name: required(product.name.as_deref(), "product.name")?,
        amount,
        currency: optional(purchase.price.currency).unwrap_or_else(|| "BRL".to_string()),
        payment_method: purchase
            .payment
            .and_then(|p| p.kind)
            .map(|kind| payment_method_label(&kind)),
        status,
        occurred_at,
    })
}

//! Sale ("venda") model.
//!
//! Sales are a denormalized ledger of approved purchases consumed by the
//! dashboards, goals and ranking views. They are written once and never
//! updated; reversals are visible only on the linked deal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Status stored on sales mirrored from an approved purchase.
pub const SALE_STATUS_APPROVED: &str = "Aprovado";

/// Represents a sale record from the `vendas` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Sale {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,

    /// Deal this sale mirrors (at most one sale per deal)
    pub deal_id: Option<Uuid>,
    pub customer_name: String,
    pub product_name: String,
    pub value: Decimal,
    pub platform: String,
    pub payment_method: Option<String>,
    pub status: String,

    /// Free text; mentions the originating transaction and deal
    pub observation: Option<String>,
    pub sale_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the `vendas` table.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub deal_id: Uuid,
    pub customer_name: String,
    pub product_name: String,
    pub value: Decimal,
    pub platform: String,
    pub payment_method: Option<String>,
    pub status: String,
    pub observation: Option<String>,
    pub sale_date: DateTime<Utc>,
}

//! Canonical purchase event.
//!
//! `PurchaseEvent` is the in-memory shape every platform payload is
//! normalized into. It is never persisted on its own; the raw payload lives
//! in the event log and its effects live on `deals`/`vendas`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::tenant::Platform;

/// Lifecycle status of a purchase as reported by the platform.
///
/// Refunds, cancellations and chargebacks cause the same deal transition but
/// are kept distinct so the recorded loss reason is accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Approved,
    Canceled,
    Refunded,
    Chargeback,
    Pending,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Approved => "approved",
            PurchaseStatus::Canceled => "canceled",
            PurchaseStatus::Refunded => "refunded",
            PurchaseStatus::Chargeback => "chargeback",
            PurchaseStatus::Pending => "pending",
        }
    }

    /// True for statuses that undo a previously approved purchase.
    pub fn is_reversal(&self) -> bool {
        matches!(
            self,
            PurchaseStatus::Canceled | PurchaseStatus::Refunded | PurchaseStatus::Chargeback
        )
    }

    fn reversal_label(&self) -> Option<&'static str> {
        match self {
            PurchaseStatus::Refunded => Some("Reembolso"),
            PurchaseStatus::Canceled => Some("Cancelamento"),
            PurchaseStatus::Chargeback => Some("Chargeback"),
            PurchaseStatus::Approved | PurchaseStatus::Pending => None,
        }
    }
}

/// Buyer as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Buyer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Normalized purchase lifecycle event.
///
/// `(platform, transaction_id)` is the natural idempotency key; together with
/// the tenant it identifies at most one webhook-created deal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseEvent {
    pub platform: Platform,
    pub transaction_id: String,

    /// Platform-native event name, e.g. `PURCHASE_APPROVED`
    pub event_type: String,
    pub buyer: Buyer,
    pub product_id: Option<String>,
    pub product_name: String,

    /// Exact amount with two fractional digits
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: Option<String>,
    pub status: PurchaseStatus,
    pub occurred_at: DateTime<Utc>,
}

impl PurchaseEvent {
    /// Human-readable loss reason for reversal events, `None` otherwise.
    ///
    /// Example: `"Reembolso via Hotmart"`.
    pub fn loss_reason(&self) -> Option<String> {
        self.status
            .reversal_label()
            .map(|label| format!("{} via {}", label, self.platform.display_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn event(status: PurchaseStatus) -> PurchaseEvent {
        PurchaseEvent {
            platform: Platform::Hotmart,
            transaction_id: "TXN-1".to_string(),
            event_type: "PURCHASE_REFUNDED".to_string(),
            buyer: Buyer {
                name: "Maria".to_string(),
                email: None,
                phone: None,
            },
            product_id: None,
            product_name: "Curso X".to_string(),
            amount: dec!(297.00),
            currency: "BRL".to_string(),
            payment_method: None,
            status,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn loss_reason_names_reversal_kind_and_platform() {
        assert_eq!(
            event(PurchaseStatus::Refunded).loss_reason().as_deref(),
            Some("Reembolso via Hotmart")
        );
        assert_eq!(
            event(PurchaseStatus::Chargeback).loss_reason().as_deref(),
            Some("Chargeback via Hotmart")
        );
        assert_eq!(event(PurchaseStatus::Approved).loss_reason(), None);
    }

    #[test]
    fn only_refund_cancel_and_chargeback_reverse() {
        assert!(PurchaseStatus::Refunded.is_reversal());
        assert!(PurchaseStatus::Canceled.is_reversal());
        assert!(PurchaseStatus::Chargeback.is_reversal());
        assert!(!PurchaseStatus::Approved.is_reversal());
        assert!(!PurchaseStatus::Pending.is_reversal());
    }
}

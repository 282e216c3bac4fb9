//! Idempotency and ordering gate.
//!
//! Platforms retry deliveries and do not promise chronological order. Before
//! any state changes, each event is checked against the deal already recorded
//! for its `(tenant, platform, transaction)` key:
//!
//! | incoming   | no deal                  | deal open or won        | deal closed_lost          |
//! |------------|--------------------------|-------------------------|---------------------------|
//! | approved   | create                   | skip: duplicate         | skip: already reversed    |
//! | reversal   | skip: no matching deal   | reverse                 | skip: duplicate / already reversed |
//! | pending    | skip: non-actionable     | skip: non-actionable    | skip: non-actionable      |
//!
//! Reversals are terminal: nothing moves a deal out of `closed_lost`.
//!
//! The lookup-then-act sequence is not atomic. The store's uniqueness rule on
//! deal inserts and the conditional reversal update close the race; the
//! reconciler maps a lost race back onto one of the skip reasons below.

use std::fmt;

use uuid::Uuid;

use crate::{
    models::{
        deal::{Deal, DealSource},
        purchase::{PurchaseEvent, PurchaseStatus},
    },
    store::{Store, StoreError},
};

/// Why an event was acknowledged without changing any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same status was already applied to this deal.
    Duplicate { deal_id: Uuid },
    /// Deal was reversed earlier; approvals never resurrect it.
    AlreadyReversed { deal_id: Uuid },
    /// Reversal for a purchase we never recorded as approved.
    NoMatchingDeal,
    /// Status with no CRM effect (waiting payment, billet printed, ...).
    NonActionable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate { .. } => "duplicate delivery",
            SkipReason::AlreadyReversed { .. } => "already reversed",
            SkipReason::NoMatchingDeal => "no matching deal",
            SkipReason::NonActionable => "non-actionable status",
        }
    }

    pub fn deal_id(&self) -> Option<Uuid> {
        match self {
            SkipReason::Duplicate { deal_id } | SkipReason::AlreadyReversed { deal_id } => {
                Some(*deal_id)
            }
            SkipReason::NoMatchingDeal | SkipReason::NonActionable => None,
        }
    }

    /// Skips that still need a human: acknowledged to the sender, logged as error.
    pub fn needs_review(&self) -> bool {
        matches!(self, SkipReason::NoMatchingDeal)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Create the deal and its mirrored sale.
    Create,
    /// Close this deal as lost.
    Reverse { deal_id: Uuid },
    Skip(SkipReason),
}

/// Apply the ordering policy to an event and the deal already on record.
pub fn decide(event: &PurchaseEvent, existing: Option<&Deal>) -> Decision {
    match (event.status, existing) {
        (PurchaseStatus::Approved, None) => Decision::Create,
        (PurchaseStatus::Approved, Some(deal)) if deal.is_reversed() => {
            Decision::Skip(SkipReason::AlreadyReversed { deal_id: deal.id })
        }
        (PurchaseStatus::Approved, Some(deal)) => {
            Decision::Skip(SkipReason::Duplicate { deal_id: deal.id })
        }

        (status, None) if status.is_reversal() => Decision::Skip(SkipReason::NoMatchingDeal),
        (status, Some(deal)) if status.is_reversal() && deal.is_reversed() => {
            if deal.loss_reason == event.loss_reason() {
                Decision::Skip(SkipReason::Duplicate { deal_id: deal.id })
            } else {
                Decision::Skip(SkipReason::AlreadyReversed { deal_id: deal.id })
            }
        }
        (status, Some(deal)) if status.is_reversal() => Decision::Reverse { deal_id: deal.id },

        _ => Decision::Skip(SkipReason::NonActionable),
    }
}

/// Look up the tenant's deal for this event and decide what to do with it.
///
/// Resolution is always scoped by tenant: equal transaction ids belonging to
/// different tenants never see each other's deals.
pub async fn should_process(
    store: &dyn Store,
    tenant_id: Uuid,
    event: &PurchaseEvent,
) -> Result<Decision, StoreError> {
    if event.status == PurchaseStatus::Pending {
        return Ok(Decision::Skip(SkipReason::NonActionable));
    }

    let existing = store
        .find_deal_by_external_id(
            tenant_id,
            DealSource::from(event.platform),
            &event.transaction_id,
        )
        .await?;

    Ok(decide(event, existing.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{deal::DealStage, purchase::Buyer, tenant::Platform};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn event(status: PurchaseStatus) -> PurchaseEvent {
        PurchaseEvent {
            platform: Platform::Hotmart,
            transaction_id: "TXN-1".to_string(),
            event_type: "PURCHASE".to_string(),
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

    fn deal(stage: DealStage, loss_reason: Option<&str>) -> Deal {
        Deal {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: None,
            title: "Curso X - Maria".to_string(),
            customer_name: "Maria".to_string(),
            customer_email: None,
            customer_phone: None,
            value: dec!(297.00),
            stage,
            probability: 100,
            external_id: Some("TXN-1".to_string()),
            source: DealSource::Hotmart,
            loss_reason: loss_reason.map(str::to_string),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn first_approval_creates() {
        assert_eq!(decide(&event(PurchaseStatus::Approved), None), Decision::Create);
    }

    #[test]
    fn repeated_approval_is_duplicate_with_same_deal() {
        let won = deal(DealStage::ClosedWon, None);
        assert_eq!(
            decide(&event(PurchaseStatus::Approved), Some(&won)),
            Decision::Skip(SkipReason::Duplicate { deal_id: won.id })
        );
    }

    #[test]
    fn approval_after_reversal_does_not_resurrect() {
        let lost = deal(DealStage::ClosedLost, Some("Reembolso via Hotmart"));
        assert_eq!(
            decide(&event(PurchaseStatus::Approved), Some(&lost)),
            Decision::Skip(SkipReason::AlreadyReversed { deal_id: lost.id })
        );
    }

    #[test]
    fn reversal_of_won_deal_reverses() {
        let won = deal(DealStage::ClosedWon, None);
        for status in [
            PurchaseStatus::Refunded,
            PurchaseStatus::Canceled,
            PurchaseStatus::Chargeback,
        ] {
            assert_eq!(
                decide(&event(status), Some(&won)),
                Decision::Reverse { deal_id: won.id }
            );
        }
    }

    #[test]
    fn reversal_of_manually_moved_deal_still_reverses() {
        let moved = deal(DealStage::Negotiation, None);
        assert_eq!(
            decide(&event(PurchaseStatus::Refunded), Some(&moved)),
            Decision::Reverse { deal_id: moved.id }
        );
    }

    #[test]
    fn orphan_reversal_is_skipped_for_review() {
        let decision = decide(&event(PurchaseStatus::Refunded), None);
        assert_eq!(decision, Decision::Skip(SkipReason::NoMatchingDeal));
        assert!(SkipReason::NoMatchingDeal.needs_review());
    }

    #[test]
    fn repeated_reversal_is_duplicate_but_other_kind_is_already_reversed() {
        let refunded = deal(DealStage::ClosedLost, Some("Reembolso via Hotmart"));

        assert_eq!(
            decide(&event(PurchaseStatus::Refunded), Some(&refunded)),
            Decision::Skip(SkipReason::Duplicate {
                deal_id: refunded.id
            })
        );
        assert_eq!(
            decide(&event(PurchaseStatus::Chargeback), Some(&refunded)),
            Decision::Skip(SkipReason::AlreadyReversed {
                deal_id: refunded.id
            })
        );
    }

    #[test]
    fn pending_never_acts() {
        let won = deal(DealStage::ClosedWon, None);
        assert_eq!(
            decide(&event(PurchaseStatus::Pending), Some(&won)),
            Decision::Skip(SkipReason::NonActionable)
        );
        assert_eq!(
            decide(&event(PurchaseStatus::Pending), None),
            Decision::Skip(SkipReason::NonActionable)
        );
    }
}

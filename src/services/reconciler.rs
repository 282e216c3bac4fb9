//! Deal/sale reconciliation - applies purchase events to CRM state.
//!
//! This service handles:
//! - Creating a won deal plus its mirrored sale on approval
//! - Closing the matching deal as lost on refund, cancellation or chargeback
//! - Re-attempting a sale mirror that failed on an earlier delivery
//!
//! # Partial Failure Policy
//!
//! The deal and the sale are two separate writes. The deal is the
//! authoritative CRM record and is never rolled back because the sale mirror
//! failed; the failure is reported as [`SaleMirror::Failed`] so the caller can
//! log it, and the next delivery of the same purchase repairs it through
//! [`ensure_sale_mirror`].

use uuid::Uuid;

use crate::{
    models::{
        deal::{Deal, DealSource, DealStage, NewDeal},
        purchase::PurchaseEvent,
        sale::{NewSale, SALE_STATUS_APPROVED},
        tenant::ResolvedTenant,
    },
    services::dedup_gate::{self, Decision, SkipReason},
    store::{DealInsert, Store, StoreError},
};

/// Outcome of the sale mirror write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleMirror {
    Created(Uuid),
    /// Our insert lost to a concurrent delivery that wrote this sale.
    Existing(Uuid),
    Failed(String),
}

/// What reconciliation did to CRM state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Created { deal_id: Uuid, sale: SaleMirror },
    Reversed { deal_id: Uuid },
    /// Nothing changed; a concurrent delivery got there first.
    Skipped(SkipReason),
}

fn deal_from_approval(tenant: &ResolvedTenant, event: &PurchaseEvent) -> NewDeal {
    let mut notes = format!(
        "Criado via webhook {}\nTransação: {}\nProduto: {}",
        event.platform.display_name(),
        event.transaction_id,
        event.product_name,
    );
    if let Some(method) = &event.payment_method {
        notes.push_str(&format!("\nPagamento: {method}"));
    }

    NewDeal {
        tenant_id: tenant.tenant_id,
        user_id: tenant.owner_user_id,
        title: format!("{} - {}", event.product_name, event.buyer.name),
        customer_name: event.buyer.name.clone(),
        customer_email: event.buyer.email.clone(),
        customer_phone: event.buyer.phone.clone(),
        value: event.amount,
        // Webhook deals skip the funnel
        stage: DealStage::ClosedWon,
        probability: 100,
        external_id: Some(event.transaction_id.clone()),
        source: DealSource::from(event.platform),
        notes: Some(notes),
    }
}

fn sale_for_deal(tenant: &ResolvedTenant, deal_id: Uuid, event: &PurchaseEvent) -> NewSale {
    NewSale {
        tenant_id: tenant.tenant_id,
        user_id: tenant.owner_user_id,
        deal_id,
        customer_name: event.buyer.name.clone(),
        product_name: event.product_name.clone(),
        value: event.amount,
        platform: event.platform.as_str().to_string(),
        payment_method: event.payment_method.clone(),
        status: SALE_STATUS_APPROVED.to_string(),
        observation: Some(format!(
            "Importado via {}. Transação {}. Deal {}",
            event.platform.display_name(),
            event.transaction_id,
            deal_id
        )),
        sale_date: event.occurred_at,
    }
}

async fn mirror_sale(
    store: &dyn Store,
    tenant: &ResolvedTenant,
    deal_id: Uuid,
    event: &PurchaseEvent,
) -> SaleMirror {
    match store
        .insert_sale(&sale_for_deal(tenant, deal_id, event))
        .await
    {
        Ok(sale) => SaleMirror::Created(sale.id),
        Err(e) => {
            // One sale per deal: a failed insert may just mean the other request won
            if let Ok(Some(existing)) = store.find_sale_by_deal(tenant.tenant_id, deal_id).await {
                tracing::info!(
                    %deal_id,
                    sale_id = %existing.id,
                    "concurrent delivery mirrored the sale first"
                );
                return SaleMirror::Existing(existing.id);
            }
            tracing::error!(
                tenant_id = %tenant.tenant_id,
                %deal_id,
                transaction_id = %event.transaction_id,
                error = %e,
                "sale mirror failed, deal kept"
            );
            SaleMirror::Failed(e.to_string())
        }
    }
}

/// Classify a deal found after our own write matched nothing.
fn skip_for_existing(event: &PurchaseEvent, existing: Option<&Deal>) -> Result<Reconciled, StoreError> {
    match dedup_gate::decide(event, existing) {
        Decision::Skip(reason) => Ok(Reconciled::Skipped(reason)),
        other => Err(StoreError::Conflict(format!(
            "deal for transaction {} changed concurrently ({other:?})",
            event.transaction_id
        ))),
    }
}

/// Record an approved purchase: a `closed_won` deal plus its mirrored sale.
///
/// If a concurrent delivery inserted the deal first, the uniqueness rule makes
/// our insert a no-op and the result is a skip carrying the winner's deal id.
pub async fn apply_approval(
    store: &dyn Store,
    tenant: &ResolvedTenant,
    event: &PurchaseEvent,
) -> Result<Reconciled, StoreError> {
    match store.insert_deal(&deal_from_approval(tenant, event)).await? {
        DealInsert::Created(deal) => {
            tracing::info!(deal_id = %deal.id, value = %deal.value, "deal created from purchase");
            let sale = mirror_sale(store, tenant, deal.id, event).await;
            Ok(Reconciled::Created {
                deal_id: deal.id,
                sale,
            })
        }
        DealInsert::Duplicate => {
            tracing::info!("concurrent delivery created the deal first");
            let existing = store
                .find_deal_by_external_id(
                    tenant.tenant_id,
                    DealSource::from(event.platform),
                    &event.transaction_id,
                )
                .await?;
            skip_for_existing(event, existing.as_ref())
        }
    }
}

/// Close the tenant's deal for this purchase as lost.
///
/// Sales are left untouched; the reversal is visible on the deal only.
pub async fn apply_reversal(
    store: &dyn Store,
    tenant: &ResolvedTenant,
    event: &PurchaseEvent,
    reason: &str,
) -> Result<Reconciled, StoreError> {
    let source = DealSource::from(event.platform);
    let note = format!(
        "{} em {} (transação {})",
        reason,
        event.occurred_at.format("%d/%m/%Y %H:%M"),
        event.transaction_id
    );

    let closed = store
        .close_deal_as_lost(
            tenant.tenant_id,
            source,
            &event.transaction_id,
            reason,
            &note,
        )
        .await?;

    if let Some(deal) = closed {
        tracing::info!(deal_id = %deal.id, loss_reason = reason, "deal closed as lost");
        return Ok(Reconciled::Reversed { deal_id: deal.id });
    }

    let existing = store
        .find_deal_by_external_id(tenant.tenant_id, source, &event.transaction_id)
        .await?;
    skip_for_existing(event, existing.as_ref())
}

/// Create the sale for an existing deal if it has none.
///
/// Returns `None` when the sale is already there, and
/// [`SaleMirror::Existing`] when a concurrent delivery wrote it while we
/// were repairing.
pub async fn ensure_sale_mirror(
    store: &dyn Store,
    tenant: &ResolvedTenant,
    deal_id: Uuid,
    event: &PurchaseEvent,
) -> Result<Option<SaleMirror>, StoreError> {
    if store
        .find_sale_by_deal(tenant.tenant_id, deal_id)
        .await?
        .is_some()
    {
        return Ok(None);
    }

    tracing::warn!(%deal_id, "deal has no sale mirror, repairing");
    Ok(Some(mirror_sale(store, tenant, deal_id, event).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        purchase::{Buyer, PurchaseStatus},
        tenant::Platform,
    };
    use crate::store::MemoryStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn event(status: PurchaseStatus) -> PurchaseEvent {
        PurchaseEvent {
            platform: Platform::Hotmart,
            transaction_id: "TXN-1".to_string(),
            event_type: "PURCHASE_APPROVED".to_string(),
            buyer: Buyer {
                name: "Maria".to_string(),
                email: Some("maria@example.com".to_string()),
                phone: None,
            },
            product_id: Some("4242".to_string()),
            product_name: "Curso X".to_string(),
            amount: dec!(297.00),
            currency: "BRL".to_string(),
            payment_method: Some("Pix".to_string()),
            status,
            occurred_at: Utc::now(),
        }
    }

    async fn tenant(store: &MemoryStore) -> ResolvedTenant {
        let owner = Uuid::new_v4();
        ResolvedTenant::from(&store.insert_tenant("Acme", Some(owner)).await)
    }

    #[tokio::test]
    async fn approval_creates_won_deal_and_sale() {
        let store = MemoryStore::new();
        let tenant = tenant(&store).await;

        let outcome = apply_approval(&store, &tenant, &event(PurchaseStatus::Approved))
            .await
            .unwrap();

        let deals = store.deals(tenant.tenant_id).await;
        let sales = store.sales(tenant.tenant_id).await;
        assert_eq!(deals.len(), 1);
        assert_eq!(sales.len(), 1);

        let deal = &deals[0];
        assert_eq!(
            outcome,
            Reconciled::Created {
                deal_id: deal.id,
                sale: SaleMirror::Created(sales[0].id)
            }
        );
        assert_eq!(deal.stage, DealStage::ClosedWon);
        assert_eq!(deal.probability, 100);
        assert_eq!(deal.title, "Curso X - Maria");
        assert_eq!(deal.user_id, tenant.owner_user_id);
        assert_eq!(sales[0].deal_id, Some(deal.id));
        assert_eq!(sales[0].status, "Aprovado");
        assert!(sales[0].observation.as_deref().unwrap().contains("TXN-1"));
    }

    #[tokio::test]
    async fn racing_approval_reports_winner_deal() {
        let store = MemoryStore::new();
        let tenant = tenant(&store).await;
        let approved = event(PurchaseStatus::Approved);

        let first = apply_approval(&store, &tenant, &approved).await.unwrap();
        let Reconciled::Created { deal_id, .. } = first else {
            panic!("first approval should create");
        };

        // Second insert bypasses the gate, as a concurrent request would
        let second = apply_approval(&store, &tenant, &approved).await.unwrap();
        assert_eq!(
            second,
            Reconciled::Skipped(SkipReason::Duplicate { deal_id })
        );
        assert_eq!(store.deals(tenant.tenant_id).await.len(), 1);
        assert_eq!(store.sales(tenant.tenant_id).await.len(), 1);
    }

    #[tokio::test]
    async fn reversal_closes_deal_and_keeps_sale() {
        let store = MemoryStore::new();
        let tenant = tenant(&store).await;
        apply_approval(&store, &tenant, &event(PurchaseStatus::Approved))
            .await
            .unwrap();

        let refund = event(PurchaseStatus::Refunded);
        let reason = refund.loss_reason().unwrap();
        let outcome = apply_reversal(&store, &tenant, &refund, &reason)
            .await
            .unwrap();

        let deal = &store.deals(tenant.tenant_id).await[0];
        assert_eq!(outcome, Reconciled::Reversed { deal_id: deal.id });
        assert_eq!(deal.stage, DealStage::ClosedLost);
        assert_eq!(deal.probability, 0);
        assert_eq!(deal.loss_reason.as_deref(), Some("Reembolso via Hotmart"));
        assert!(deal.notes.as_deref().unwrap().contains("Reembolso via Hotmart em"));
        assert_eq!(store.sales(tenant.tenant_id).await[0].value, dec!(297.00));
    }

    #[tokio::test]
    async fn racing_reversal_transitions_once() {
        let store = MemoryStore::new();
        let tenant = tenant(&store).await;
        apply_approval(&store, &tenant, &event(PurchaseStatus::Approved))
            .await
            .unwrap();

        let refund = event(PurchaseStatus::Refunded);
        let reason = refund.loss_reason().unwrap();
        apply_reversal(&store, &tenant, &refund, &reason)
            .await
            .unwrap();
        let second = apply_reversal(&store, &tenant, &refund, &reason)
            .await
            .unwrap();

        assert!(matches!(
            second,
            Reconciled::Skipped(SkipReason::Duplicate { .. })
        ));
        let notes = store.deals(tenant.tenant_id).await[0].notes.clone().unwrap();
        assert_eq!(notes.matches("Reembolso via Hotmart em").count(), 1);
    }

    #[tokio::test]
    async fn reversal_without_deal_is_orphan() {
        let store = MemoryStore::new();
        let tenant = tenant(&store).await;
        let refund = event(PurchaseStatus::Refunded);

        let outcome = apply_reversal(&store, &tenant, &refund, "Reembolso via Hotmart")
            .await
            .unwrap();

        assert_eq!(outcome, Reconciled::Skipped(SkipReason::NoMatchingDeal));
        assert!(store.deals(tenant.tenant_id).await.is_empty());
    }

    #[tokio::test]
    async fn missing_sale_is_repaired_once() {
        let store = MemoryStore::new();
        let tenant = tenant(&store).await;
        let approved = event(PurchaseStatus::Approved);

        let DealInsert::Created(deal) = store
            .insert_deal(&deal_from_approval(&tenant, &approved))
            .await
            .unwrap()
        else {
            panic!("deal insert should succeed");
        };

        let repaired = ensure_sale_mirror(&store, &tenant, deal.id, &approved)
            .await
            .unwrap();
        assert!(matches!(repaired, Some(SaleMirror::Created(_))));

        let again = ensure_sale_mirror(&store, &tenant, deal.id, &approved)
            .await
            .unwrap();
        assert_eq!(again, None);
        assert_eq!(store.sales(tenant.tenant_id).await.len(), 1);
    }

    #[tokio::test]
    async fn sale_written_concurrently_is_not_a_failure() {
        let store = MemoryStore::new();
        let tenant = tenant(&store).await;
        let approved = event(PurchaseStatus::Approved);

        let DealInsert::Created(deal) = store
            .insert_deal(&deal_from_approval(&tenant, &approved))
            .await
            .unwrap()
        else {
            panic!("deal insert should succeed");
        };
        // The other request's sale lands between our check and our insert
        let theirs = store
            .insert_sale(&sale_for_deal(&tenant, deal.id, &approved))
            .await
            .unwrap();

        let mirror = mirror_sale(&store, &tenant, deal.id, &approved).await;

        assert_eq!(mirror, SaleMirror::Existing(theirs.id));
        assert_eq!(store.sales(tenant.tenant_id).await.len(), 1);
    }
}

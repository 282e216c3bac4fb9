//! In-process implementation of [`Store`].
//!
//! Mirrors the uniqueness rules the PostgreSQL schema enforces so pipeline
//! behavior (duplicates, races, reversals) is identical on both backends.
//! All tables sit behind one lock, which makes every operation atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    models::{
        api_key::ApiKey,
        deal::{Deal, DealSource, DealStage, NewDeal},
        event_log::{
            EventLogEntry, EventLogFilter, EventLogOutcome, EventLogStatus, NewEventLogEntry,
        },
        sale::{NewSale, Sale},
        tenant::{PlanTier, Platform, PlatformCredential, ResolvedTenant, Tenant},
    },
    store::{DealInsert, Store, StoreError},
};

#[derive(Debug, Default)]
struct Tables {
    tenants: HashMap<Uuid, Tenant>,
    credentials: Vec<PlatformCredential>,
    api_keys: Vec<ApiKey>,
    deals: Vec<Deal>,
    sales: Vec<Sale>,
    events: Vec<EventLogEntry>,
}

/// Store keeping every table in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_tenant(&self, name: &str, owner_user_id: Option<Uuid>) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            plan_tier: PlanTier::Free,
            owner_user_id,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .tenants
            .insert(tenant.id, tenant.clone());
        tenant
    }

    /// Register a credential. A previously active credential for the same
    /// `(tenant, platform)` is deactivated, keeping one active per pair.
    pub async fn insert_credential(
        &self,
        tenant_id: Uuid,
        platform: Platform,
        secret_hash: &str,
    ) -> Result<PlatformCredential, StoreError> {
        let mut tables = self.tables.write().await;

        if tables
            .credentials
            .iter()
            .any(|c| c.secret_hash == secret_hash)
        {
            return Err(StoreError::Conflict("secret already registered".to_string()));
        }

        for existing in tables
            .credentials
            .iter_mut()
            .filter(|c| c.tenant_id == tenant_id && c.platform == platform)
        {
            existing.is_active = false;
        }

        let credential = PlatformCredential {
            id: Uuid::new_v4(),
            tenant_id,
            platform,
            secret_hash: secret_hash.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        tables.credentials.push(credential.clone());
        Ok(credential)
    }

    pub async fn deactivate_credential(&self, credential_id: Uuid) {
        let mut tables = self.tables.write().await;
        if let Some(credential) = tables
            .credentials
            .iter_mut()
            .find(|c| c.id == credential_id)
        {
            credential.is_active = false;
        }
    }

    pub async fn insert_api_key(&self, tenant_id: Uuid, name: &str, key_hash: &str) -> ApiKey {
        let key = ApiKey {
            id: Uuid::new_v4(),
            tenant_id,
            key_hash: key_hash.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            is_active: true,
        };
        self.tables.write().await.api_keys.push(key.clone());
        key
    }

    /// All deals of a tenant, in insertion order.
    pub async fn deals(&self, tenant_id: Uuid) -> Vec<Deal> {
        self.tables
            .read()
            .await
            .deals
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// All sales of a tenant, in insertion order.
    pub async fn sales(&self, tenant_id: Uuid) -> Vec<Sale> {
        self.tables
            .read()
            .await
            .sales
            .iter()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// Every log entry, including unattributed ones, in insertion order.
    pub async fn event_log(&self) -> Vec<EventLogEntry> {
        self.tables.read().await.events.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_active_credential(
        &self,
        platform: Platform,
        secret_hash: &str,
    ) -> Result<Option<ResolvedTenant>, StoreError> {
        let tables = self.tables.read().await;
        let tenant = tables
            .credentials
            .iter()
            .find(|c| c.is_active && c.platform == platform && c.secret_hash == secret_hash)
            .and_then(|c| tables.tenants.get(&c.tenant_id))
            .map(ResolvedTenant::from);

        Ok(tenant)
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tables.read().await.tenants.get(&tenant_id).cloned())
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .api_keys
            .iter()
            .find(|k| k.is_active && k.key_hash == key_hash)
            .cloned())
    }

    async fn insert_event_log(
        &self,
        entry: NewEventLogEntry,
    ) -> Result<EventLogEntry, StoreError> {
        let now = Utc::now();
        let inserted = EventLogEntry {
            id: Uuid::new_v4(),
            tenant_id: entry.tenant_id,
            platform: entry.platform,
            event_type: entry.event_type,
            external_id: None,
            payload: entry.payload,
            status: entry.status,
            error_message: entry.error_message,
            skip_reason: None,
            deal_id: None,
            replayed_from: entry.replayed_from,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.events.push(inserted.clone());
        Ok(inserted)
    }

    async fn finish_event_log(
        &self,
        id: Uuid,
        outcome: &EventLogOutcome,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(entry) = tables.events.iter_mut().find(|e| e.id == id) {
            entry.status = outcome.status;
            if outcome.event_type.is_some() {
                entry.event_type = outcome.event_type.clone();
            }
            if outcome.external_id.is_some() {
                entry.external_id = outcome.external_id.clone();
            }
            entry.error_message = outcome.error_message.clone();
            entry.skip_reason = outcome.skip_reason.clone();
            entry.deal_id = outcome.deal_id;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_event_log(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<EventLogEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .find(|e| e.id == id && e.tenant_id == Some(tenant_id))
            .cloned())
    }

    async fn list_event_log(
        &self,
        tenant_id: Uuid,
        filter: &EventLogFilter,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .rev()
            .filter(|e| e.tenant_id == Some(tenant_id))
            .filter(|e| filter.status.is_none_or(|status| e.status == status))
            .take(filter.effective_limit() as usize)
            .cloned()
            .collect())
    }

    async fn list_stale_processing(
        &self,
        tenant_id: Uuid,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.tenant_id == Some(tenant_id))
            .filter(|e| e.status == EventLogStatus::Processing)
            .filter(|e| e.created_at < older_than)
            .cloned()
            .collect())
    }

    async fn find_deal_by_external_id(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
    ) -> Result<Option<Deal>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deals
            .iter()
            .find(|d| {
                d.tenant_id == tenant_id
                    && d.source == source
                    && d.external_id.as_deref() == Some(external_id)
            })
            .cloned())
    }

    async fn insert_deal(&self, deal: &NewDeal) -> Result<DealInsert, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(external_id) = deal.external_id.as_deref() {
            let taken = tables.deals.iter().any(|d| {
                d.tenant_id == deal.tenant_id
                    && d.source == deal.source
                    && d.external_id.as_deref() == Some(external_id)
            });
            if taken {
                return Ok(DealInsert::Duplicate);
            }
        }

        let now = Utc::now();
        let inserted = Deal {
            id: Uuid::new_v4(),
            tenant_id: deal.tenant_id,
            user_id: deal.user_id,
            title: deal.title.clone(),
            customer_name: deal.customer_name.clone(),
            customer_email: deal.customer_email.clone(),
            customer_phone: deal.customer_phone.clone(),
            value: deal.value,
            stage: deal.stage,
            probability: deal.probability,
            external_id: deal.external_id.clone(),
            source: deal.source,
            loss_reason: None,
            notes: deal.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.deals.push(inserted.clone());
        Ok(DealInsert::Created(inserted))
    }

    async fn close_deal_as_lost(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
        loss_reason: &str,
        note: &str,
    ) -> Result<Option<Deal>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(deal) = tables.deals.iter_mut().find(|d| {
            d.tenant_id == tenant_id
                && d.source == source
                && d.external_id.as_deref() == Some(external_id)
                && d.stage != DealStage::ClosedLost
        }) else {
            return Ok(None);
        };

        deal.stage = DealStage::ClosedLost;
        deal.probability = 0;
        deal.loss_reason = Some(loss_reason.to_string());
        deal.notes = Some(match deal.notes.take() {
            Some(notes) if !notes.is_empty() => format!("{notes}\n{note}"),
            _ => note.to_string(),
        });
        deal.updated_at = Utc::now();
        Ok(Some(deal.clone()))
    }

    async fn find_sale_by_deal(
        &self,
        tenant_id: Uuid,
        deal_id: Uuid,
    ) -> Result<Option<Sale>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sales
            .iter()
            .find(|s| s.tenant_id == tenant_id && s.deal_id == Some(deal_id))
            .cloned())
    }

    async fn insert_sale(&self, sale: &NewSale) -> Result<Sale, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.sales.iter().any(|s| s.deal_id == Some(sale.deal_id)) {
            return Err(StoreError::Conflict(format!(
                "deal {} already has a sale",
                sale.deal_id
            )));
        }

        let inserted = Sale {
            id: Uuid::new_v4(),
            tenant_id: sale.tenant_id,
            user_id: sale.user_id,
            deal_id: Some(sale.deal_id),
            customer_name: sale.customer_name.clone(),
            product_name: sale.product_name.clone(),
            value: sale.value,
            platform: sale.platform.clone(),
            payment_method: sale.payment_method.clone(),
            status: sale.status.clone(),
            observation: sale.observation.clone(),
            sale_date: sale.sale_date,
            created_at: Utc::now(),
        };
        tables.sales.push(inserted.clone());
        Ok(inserted)
    }
}

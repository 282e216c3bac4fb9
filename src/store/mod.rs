//! Persistence operations consumed by the ingestion pipeline.
//!
//! The pipeline never talks to the database directly; it goes through the
//! [`Store`] trait so the same logic runs against PostgreSQL in production
//! and against [`MemoryStore`] in tests.
//!
//! # Guarantees every implementation must provide
//!
//! - Credential lookup by secret hash only returns *active* credentials.
//! - `insert_deal` enforces uniqueness of `(tenant_id, source, external_id)`
//!   and reports a collision as [`DealInsert::Duplicate`], never as an error.
//! - `close_deal_as_lost` is a single conditional write: it only transitions a
//!   deal that is not already `closed_lost`.
//! - Every read that returns tenant data is filtered by tenant id.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    api_key::ApiKey,
    deal::{Deal, DealSource, NewDeal},
    event_log::{EventLogEntry, EventLogFilter, EventLogOutcome, NewEventLogEntry},
    sale::{NewSale, Sale},
    tenant::{Platform, ResolvedTenant, Tenant},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage failure. Always surfaces as HTTP 500 and is safe to retry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend reachable but refusing work (also used by test doubles).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result of a deal insert.
#[derive(Debug, Clone)]
pub enum DealInsert {
    Created(Deal),
    /// A deal with the same `(tenant_id, source, external_id)` already exists.
    Duplicate,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Tenant owning the *active* credential with this secret hash.
    async fn find_active_credential(
        &self,
        platform: Platform,
        secret_hash: &str,
    ) -> Result<Option<ResolvedTenant>, StoreError>;

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError>;

    /// Active API key with this hash.
    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError>;

    async fn insert_event_log(
        &self,
        entry: NewEventLogEntry,
    ) -> Result<EventLogEntry, StoreError>;

    /// Write the final status and outcome fields onto an entry.
    async fn finish_event_log(
        &self,
        id: Uuid,
        outcome: &EventLogOutcome,
    ) -> Result<(), StoreError>;

    async fn get_event_log(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<EventLogEntry>, StoreError>;

    /// Newest first.
    async fn list_event_log(
        &self,
        tenant_id: Uuid,
        filter: &EventLogFilter,
    ) -> Result<Vec<EventLogEntry>, StoreError>;

    /// Entries still at `processing` created before `older_than`, oldest first.
    async fn list_stale_processing(
        &self,
        tenant_id: Uuid,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<EventLogEntry>, StoreError>;

    async fn find_deal_by_external_id(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
    ) -> Result<Option<Deal>, StoreError>;

    async fn insert_deal(&self, deal: &NewDeal) -> Result<DealInsert, StoreError>;

    /// Move a not-yet-lost deal to `closed_lost` with probability 0, set the
    /// loss reason and append `note`. Returns `None` when no deal matched.
    async fn close_deal_as_lost(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
        loss_reason: &str,
        note: &str,
    ) -> Result<Option<Deal>, StoreError>;

    async fn find_sale_by_deal(
        &self,
        tenant_id: Uuid,
        deal_id: Uuid,
    ) -> Result<Option<Sale>, StoreError>;

    async fn insert_sale(&self, sale: &NewSale) -> Result<Sale, StoreError>;
}

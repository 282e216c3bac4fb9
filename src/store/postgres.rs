//! PostgreSQL implementation of [`Store`].
//!
//! Correctness under concurrent delivery leans on the schema:
//! - `deals_tenant_source_external_id` (partial unique index) turns a racing
//!   second insert into `ON CONFLICT DO NOTHING`, reported as a duplicate
//! - the reversal `UPDATE` carries its own `stage <> 'closed_lost'` guard, so
//!   two racing reversals produce exactly one transition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    models::{
        api_key::ApiKey,
        deal::{Deal, DealSource, NewDeal},
        event_log::{EventLogEntry, EventLogFilter, EventLogOutcome, NewEventLogEntry},
        sale::{NewSale, Sale},
        tenant::{Platform, ResolvedTenant, Tenant},
    },
    store::{DealInsert, Store, StoreError},
};

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_active_credential(
        &self,
        platform: Platform,
        secret_hash: &str,
    ) -> Result<Option<ResolvedTenant>, StoreError> {
        let tenant = sqlx::query_as::<_, ResolvedTenant>(
            r#"
            SELECT t.id AS tenant_id, t.owner_user_id
            FROM platform_credentials c
            JOIN tenants t ON t.id = c.tenant_id
            WHERE c.secret_hash = $1
              AND c.platform = $2
              AND c.is_active = true
            "#,
        )
        .bind(secret_hash)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tenant)
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT id, tenant_id, key_hash, name, created_at, is_active
             FROM api_keys
             WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn insert_event_log(
        &self,
        entry: NewEventLogEntry,
    ) -> Result<EventLogEntry, StoreError> {
        let inserted = sqlx::query_as::<_, EventLogEntry>(
            r#"
            INSERT INTO webhook_events (
                tenant_id,
                platform,
                event_type,
                payload,
                status,
                error_message,
                replayed_from
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(entry.tenant_id)
        .bind(&entry.platform)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.replayed_from)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn finish_event_log(
        &self,
        id: Uuid,
        outcome: &EventLogOutcome,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = $2,
                event_type = COALESCE($3, event_type),
                external_id = COALESCE($4, external_id),
                error_message = $5,
                skip_reason = $6,
                deal_id = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(outcome.status.as_str())
        .bind(&outcome.event_type)
        .bind(&outcome.external_id)
        .bind(&outcome.error_message)
        .bind(&outcome.skip_reason)
        .bind(outcome.deal_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_event_log(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<EventLogEntry>, StoreError> {
        let entry = sqlx::query_as::<_, EventLogEntry>(
            "SELECT * FROM webhook_events WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn list_event_log(
        &self,
        tenant_id: Uuid,
        filter: &EventLogFilter,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        let entries = sqlx::query_as::<_, EventLogEntry>(
            r#"
            SELECT * FROM webhook_events
            WHERE tenant_id = $1
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn list_stale_processing(
        &self,
        tenant_id: Uuid,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        let entries = sqlx::query_as::<_, EventLogEntry>(
            r#"
            SELECT * FROM webhook_events
            WHERE tenant_id = $1
              AND status = 'processing'
              AND created_at < $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn find_deal_by_external_id(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
    ) -> Result<Option<Deal>, StoreError> {
        let deal = sqlx::query_as::<_, Deal>(
            "SELECT * FROM deals WHERE tenant_id = $1 AND source = $2 AND external_id = $3",
        )
        .bind(tenant_id)
        .bind(source.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(deal)
    }

    async fn insert_deal(&self, deal: &NewDeal) -> Result<DealInsert, StoreError> {
        let inserted = sqlx::query_as::<_, Deal>(
            r#"
            INSERT INTO deals (
                tenant_id,
                user_id,
                title,
                customer_name,
                customer_email,
                customer_phone,
                value,
                stage,
                probability,
                external_id,
                source,
                notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (tenant_id, source, external_id) WHERE external_id IS NOT NULL
            DO NOTHING
            RETURNING *
            "#,
        )
        .bind(deal.tenant_id)
        .bind(deal.user_id)
        .bind(&deal.title)
        .bind(&deal.customer_name)
        .bind(&deal.customer_email)
        .bind(&deal.customer_phone)
        .bind(deal.value)
        .bind(deal.stage.as_str())
        .bind(deal.probability)
        .bind(&deal.external_id)
        .bind(deal.source.as_str())
        .bind(&deal.notes)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some(deal) => DealInsert::Created(deal),
            None => DealInsert::Duplicate,
        })
    }

    async fn close_deal_as_lost(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
        loss_reason: &str,
        note: &str,
    ) -> Result<Option<Deal>, StoreError> {
        let deal = sqlx::query_as::<_, Deal>(
            r#"
            UPDATE deals
            SET stage = 'closed_lost',
                probability = 0,
                loss_reason = $4,
                notes = CASE
                    WHEN notes IS NULL OR notes = '' THEN $5
                    ELSE notes || E'\n' || $5
                END,
                updated_at = NOW()
            WHERE tenant_id = $1
              AND source = $2
              AND external_id = $3
              AND stage <> 'closed_lost'
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(source.as_str())
        .bind(external_id)
        .bind(loss_reason)
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;

        Ok(deal)
    }

    async fn find_sale_by_deal(
        &self,
        tenant_id: Uuid,
        deal_id: Uuid,
    ) -> Result<Option<Sale>, StoreError> {
        let sale =
            sqlx::query_as::<_, Sale>("SELECT * FROM vendas WHERE tenant_id = $1 AND deal_id = $2")
                .bind(tenant_id)
                .bind(deal_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(sale)
    }

    async fn insert_sale(&self, sale: &NewSale) -> Result<Sale, StoreError> {
        let inserted = sqlx::query_as::<_, Sale>(
            r#"
            INSERT INTO vendas (
                tenant_id,
                user_id,
                deal_id,
                customer_name,
                product_name,
                value,
                platform,
                payment_method,
                status,
                observation,
                sale_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(sale.tenant_id)
        .bind(sale.user_id)
        .bind(sale.deal_id)
        .bind(&sale.customer_name)
        .bind(&sale.product_name)
        .bind(sale.value)
        .bind(&sale.platform)
        .bind(&sale.payment_method)
        .bind(&sale.status)
        .bind(&sale.observation)
        .bind(sale.sale_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }
}

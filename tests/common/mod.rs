//! Test utilities and fixtures for ingestion integration tests

#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

pub use sales_webhook_ingest::app::{AppState, router};
pub use sales_webhook_ingest::models::{
    api_key::ApiKey,
    deal::{Deal, DealSource, DealStage, NewDeal},
    event_log::{EventLogEntry, EventLogFilter, EventLogOutcome, EventLogStatus, NewEventLogEntry},
    sale::{NewSale, Sale},
    tenant::{Platform, ResolvedTenant, Tenant},
};
pub use sales_webhook_ingest::services::credential_service::hash_secret;
pub use sales_webhook_ingest::store::{DealInsert, MemoryStore, Store, StoreError};

pub const HOTMART_HEADER: &str = "x-hotmart-hottok";
pub const KIWIFY_HEADER: &str = "x-kiwify-token";

/// A seeded tenant with one credential per platform and an admin API key.
pub struct TestTenant {
    pub tenant: Tenant,
    pub hotmart_secret: String,
    pub kiwify_secret: String,
    pub api_key: String,
}

impl TestTenant {
    pub fn id(&self) -> Uuid {
        self.tenant.id
    }
}

/// Create a tenant whose secrets and API key are derived from `name`.
pub async fn seed_tenant(store: &MemoryStore, name: &str) -> TestTenant {
    let tenant = store.insert_tenant(name, Some(Uuid::new_v4())).await;

    let hotmart_secret = format!("hottok-{name}");
    let kiwify_secret = format!("kiwify-{name}");
    let api_key = format!("sk_test_{name}");

    store
        .insert_credential(tenant.id, Platform::Hotmart, &hash_secret(&hotmart_secret))
        .await
        .expect("Failed to seed hotmart credential");
    store
        .insert_credential(tenant.id, Platform::Kiwify, &hash_secret(&kiwify_secret))
        .await
        .expect("Failed to seed kiwify credential");
    store
        .insert_api_key(tenant.id, "test key", &hash_secret(&api_key))
        .await;

    TestTenant {
        tenant,
        hotmart_secret,
        kiwify_secret,
        api_key,
    }
}

/// Router over an in-memory store with the default stale window.
pub fn test_app(store: Arc<dyn Store>) -> Router {
    router(AppState::new(store, Duration::minutes(15)))
}

/// Hotmart v2 payload for one purchase event.
pub fn hotmart_payload(event: &str, transaction: &str, price: Value) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "creation_date": 1_700_000_500_000_i64,
        "event": event,
        "version": "2.0.0",
        "data": {
            "product": { "id": 4242, "name": "Curso X" },
            "buyer": {
                "name": "Maria Souza",
                "email": "maria@example.com",
                "checkout_phone": "5511999990000"
            },
            "purchase": {
                "transaction": transaction,
                "approved_date": 1_700_000_000_000_i64,
                "price": { "value": price, "currency_value": "BRL" },
                "payment": { "type": "CREDIT_CARD" }
            }
        }
    })
}

pub fn approved(transaction: &str) -> Value {
    hotmart_payload("PURCHASE_APPROVED", transaction, json!(297.00))
}

/// Kiwify order payload; `charge_cents` is in cents.
pub fn kiwify_payload(order_status: &str, order_id: &str, charge_cents: i64) -> Value {
    json!({
        "order_id": order_id,
        "order_status": order_status,
        "payment_method": "pix",
        "created_at": "2024-05-02 09:15",
        "approved_date": "2024-05-02 09:20",
        "Product": { "product_id": "prod-9", "product_name": "Mentoria" },
        "Customer": {
            "full_name": "João Lima",
            "email": "joao@example.com",
            "mobile": "+5521988887777"
        },
        "Commissions": { "charge_amount": charge_cents, "currency": "BRL" }
    })
}

/// Send a request and return status plus JSON body (`Null` if not JSON).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// POST a raw body to `/webhooks/{platform}` with an optional secret header.
pub async fn post_raw(
    app: &Router,
    platform: &str,
    secret: Option<(&str, &str)>,
    body: impl Into<Body>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{platform}"))
        .header("content-type", "application/json");
    if let Some((header, value)) = secret {
        builder = builder.header(header, value);
    }
    send(app, builder.body(body.into()).unwrap()).await
}

pub async fn post_hotmart(app: &Router, tenant: &TestTenant, payload: &Value) -> (StatusCode, Value) {
    post_raw(
        app,
        "hotmart",
        Some((HOTMART_HEADER, tenant.hotmart_secret.as_str())),
        payload.to_string(),
    )
    .await
}

pub async fn post_kiwify(app: &Router, tenant: &TestTenant, payload: &Value) -> (StatusCode, Value) {
    post_raw(
        app,
        "kiwify",
        Some((KIWIFY_HEADER, tenant.kiwify_secret.as_str())),
        payload.to_string(),
    )
    .await
}

/// Admin API request with the tenant's API key.
pub async fn admin(
    app: &Router,
    method: &str,
    uri: &str,
    api_key: &str,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {api_key}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub fn deal_id(body: &Value) -> Uuid {
    body["deal_id"]
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .expect("response should carry a deal_id")
}

/// Store wrapper that fails or slows selected operations on demand.
///
/// Delegates to a [`MemoryStore`] otherwise, so state written before a fault
/// is switched on remains visible.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    fail_sales: AtomicBool,
    fail_deals: AtomicBool,
    fail_all: AtomicBool,
    slow: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_sales: AtomicBool::new(false),
            fail_deals: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
            slow: AtomicBool::new(false),
        }
    }

    pub fn fail_sales(&self, fail: bool) {
        self.fail_sales.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deals(&self, fail: bool) {
        self.fail_deals.store(fail, Ordering::SeqCst);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Yield to the scheduler before every call so concurrent requests interleave.
    pub fn slow(&self, slow: bool) {
        self.slow.store(slow, Ordering::SeqCst);
    }

    async fn check_after(&self, yields: usize) -> Result<(), StoreError> {
        if self.slow.load(Ordering::SeqCst) {
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }
        }
        self.check()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_after(1).await?;
        self.inner.ping().await
    }

    async fn find_active_credential(
        &self,
        platform: Platform,
        secret_hash: &str,
    ) -> Result<Option<ResolvedTenant>, StoreError> {
        self.check_after(1).await?;
        self.inner.find_active_credential(platform, secret_hash).await
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        self.check_after(1).await?;
        self.inner.get_tenant(tenant_id).await
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        self.check_after(1).await?;
        self.inner.find_api_key(key_hash).await
    }

    async fn insert_event_log(
        &self,
        entry: NewEventLogEntry,
    ) -> Result<EventLogEntry, StoreError> {
        self.check_after(1).await?;
        self.inner.insert_event_log(entry).await
    }

    async fn finish_event_log(
        &self,
        id: Uuid,
        outcome: &EventLogOutcome,
    ) -> Result<(), StoreError> {
        self.check_after(1).await?;
        self.inner.finish_event_log(id, outcome).await
    }

    async fn get_event_log(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<EventLogEntry>, StoreError> {
        self.check_after(1).await?;
        self.inner.get_event_log(tenant_id, id).await
    }

    async fn list_event_log(
        &self,
        tenant_id: Uuid,
        filter: &EventLogFilter,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        self.check_after(1).await?;
        self.inner.list_event_log(tenant_id, filter).await
    }

    async fn list_stale_processing(
        &self,
        tenant_id: Uuid,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        self.check_after(1).await?;
        self.inner.list_stale_processing(tenant_id, older_than).await
    }

    async fn find_deal_by_external_id(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
    ) -> Result<Option<Deal>, StoreError> {
        self.check_after(1).await?;
        self.inner
            .find_deal_by_external_id(tenant_id, source, external_id)
            .await
    }

    async fn insert_deal(&self, deal: &NewDeal) -> Result<DealInsert, StoreError> {
        self.check_after(1).await?;
        if self.fail_deals.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("deals write timed out".to_string()));
        }
        self.inner.insert_deal(deal).await
    }

    async fn close_deal_as_lost(
        &self,
        tenant_id: Uuid,
        source: DealSource,
        external_id: &str,
        loss_reason: &str,
        note: &str,
    ) -> Result<Option<Deal>, StoreError> {
        self.check_after(1).await?;
        self.inner
            .close_deal_as_lost(tenant_id, source, external_id, loss_reason, note)
            .await
    }

    async fn find_sale_by_deal(
        &self,
        tenant_id: Uuid,
        deal_id: Uuid,
    ) -> Result<Option<Sale>, StoreError> {
        self.check_after(1).await?;
        self.inner.find_sale_by_deal(tenant_id, deal_id).await
    }

    async fn insert_sale(&self, sale: &NewSale) -> Result<Sale, StoreError> {
        self.check_after(10).await?;
        if self.fail_sales.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("vendas write timed out".to_string()));
        }
        self.inner.insert_sale(sale).await
    }
}

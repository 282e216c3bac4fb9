//! Webhook event log recording and queries.
//!
//! Writes that only record *what happened* (rejections, final outcomes) are
//! best-effort: a failure is logged and swallowed, so a log outage never
//! changes the answer the sender gets. The initial `processing` insert is
//! the exception; without it a delivery would leave no trace, so its failure
//! fails the request and the platform retries.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    models::event_log::{EventLogEntry, EventLogFilter, EventLogOutcome, NewEventLogEntry},
    store::{Store, StoreError},
};

/// Record a delivery rejected before tenant attribution.
pub async fn record_rejection(store: &dyn Store, entry: NewEventLogEntry) {
    let platform = entry.platform.clone();
    if let Err(e) = store.insert_event_log(entry).await {
        tracing::error!(%platform, error = %e, "failed to record rejected webhook");
    }
}

/// Open a `processing` entry for a delivery with a known tenant.
pub async fn begin(
    store: &dyn Store,
    entry: NewEventLogEntry,
) -> Result<EventLogEntry, StoreError> {
    store.insert_event_log(entry).await
}

/// Write the final outcome onto an entry opened with [`begin`].
pub async fn finish(store: &dyn Store, entry_id: Uuid, outcome: &EventLogOutcome) {
    if let Err(e) = store.finish_event_log(entry_id, outcome).await {
        tracing::error!(
            %entry_id,
            status = %outcome.status,
            error = %e,
            "failed to finalize webhook event log entry"
        );
    }
}

pub async fn list(
    store: &dyn Store,
    tenant_id: Uuid,
    filter: &EventLogFilter,
) -> Result<Vec<EventLogEntry>, StoreError> {
    store.list_event_log(tenant_id, filter).await
}

pub async fn get(
    store: &dyn Store,
    tenant_id: Uuid,
    entry_id: Uuid,
) -> Result<Option<EventLogEntry>, StoreError> {
    store.get_event_log(tenant_id, entry_id).await
}

/// Entries stuck at `processing` for longer than `stale_after`.
///
/// These are deliveries whose process died mid-request. They may or may not
/// have been applied; replaying is safe because the gate is idempotent.
pub async fn stale(
    store: &dyn Store,
    tenant_id: Uuid,
    stale_after: Duration,
) -> Result<Vec<EventLogEntry>, StoreError> {
    store
        .list_stale_processing(tenant_id, Utc::now() - stale_after)
        .await
}

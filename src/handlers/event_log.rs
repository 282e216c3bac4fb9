//! HTTP handlers for auditing and replaying a tenant's webhook deliveries.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        event_log::{EventLogEntry, EventLogFilter},
        webhook::WebhookAck,
    },
    services::{event_log, ingest_service},
};

/// List the tenant's webhook deliveries, newest first.
///
/// # Query Parameters
///
/// - `status`: `received`, `processing`, `success` or `error`
/// - `limit`: default 50, max 200
pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<EventLogFilter>,
) -> Result<Json<Vec<EventLogEntry>>, AppError> {
    let entries = event_log::list(state.store.as_ref(), auth.tenant_id, &filter).await?;

    Ok(Json(entries))
}

/// Deliveries still at `processing` after the configured stale window.
///
/// Such an entry means the process stopped mid-request. The event may or may
/// not have been applied; replaying it is safe.
pub async fn list_stale_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<EventLogEntry>>, AppError> {
    let entries = event_log::stale(state.store.as_ref(), auth.tenant_id, state.stale_after).await?;

    Ok(Json(entries))
}

/// Get one delivery.
///
/// Returns 404 if the entry does not exist or belongs to another tenant.
pub async fn get_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<EventLogEntry>, AppError> {
    let entry = event_log::get(state.store.as_ref(), auth.tenant_id, entry_id)
        .await?
        .ok_or(AppError::NotFound("Webhook event"))?;

    Ok(Json(entry))
}

/// Re-run a stored delivery through the pipeline.
///
/// # Response (200 OK)
///
/// Same body the platform would have received. Replaying an event that was
/// already applied is acknowledged as a skip and changes nothing.
pub async fn replay_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<WebhookAck>, AppError> {
    tracing::info!(
        api_key_id = %auth.api_key_id,
        key_name = %auth.key_name,
        %entry_id,
        "webhook replay requested"
    );
    let ack = ingest_service::replay(state.store.as_ref(), auth.tenant_id, entry_id).await?;

    Ok(Json(ack))
}

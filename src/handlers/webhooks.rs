//! HTTP handler receiving purchase webhooks from sales platforms.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};

use crate::{
    app::AppState, error::AppError, models::webhook::WebhookAck, services::ingest_service,
};

/// Receive a purchase event from a sales platform.
///
/// # Authentication
///
/// No API key. The tenant is resolved from the platform's shared-secret
/// header (`x-hotmart-hottok`, `x-kiwify-token`).
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "success": true,
///   "event": "PURCHASE_APPROVED",
///   "deal_id": "550e8400-e29b-41d4-a716-446655440000"
/// }
/// ```
///
/// Redelivery of an already-applied event also returns 200, with the same
/// `deal_id` and a `skipped` reason.
///
/// # Errors
///
/// - 401 if the secret is missing or matches no active credential
/// - 400 if the payload cannot be normalized
/// - 404 for an unknown platform
/// - 500 on storage failure (safe for the platform to retry)
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let ack = ingest_service::ingest(state.store.as_ref(), &platform, &headers, &body).await?;

    Ok(Json(ack))
}

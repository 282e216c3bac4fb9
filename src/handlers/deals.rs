//! HTTP handler for looking up webhook-created deals.

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::{
    app::AppState,
    error::AppError,
    middleware::auth::AuthContext,
    models::{deal::DealSource, tenant::Platform, webhook::DealLookupResponse},
};

/// Get the deal created for a platform transaction, with its mirrored sale.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "deal": { "id": "...", "stage": "closed_won", "value": "297.00", ... },
///   "sale": { "id": "...", "status": "Aprovado", "value": "297.00", ... }
/// }
/// ```
///
/// `sale` is `null` when the mirror write failed and has not been repaired.
pub async fn get_deal_by_external_id(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((platform, external_id)): Path<(String, String)>,
) -> Result<Json<DealLookupResponse>, AppError> {
    let platform = platform
        .parse::<Platform>()
        .map_err(|_| AppError::UnknownPlatform(platform.clone()))?;

    let deal = state
        .store
        .find_deal_by_external_id(auth.tenant_id, DealSource::from(platform), &external_id)
        .await?
        .ok_or(AppError::NotFound("Deal"))?;

    let sale = state
        .store
        .find_sale_by_deal(auth.tenant_id, deal.id)
        .await?;

    Ok(Json(DealLookupResponse { deal, sale }))
}

//! API key authentication middleware for the tenant admin API.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and look it up among active keys
//! 3. Inject the owning tenant into the request
//! 4. Reject unauthorized requests with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{app::AppState, error::AppError, services::credential_service::hash_secret};

/// Authentication context attached to authenticated requests.
///
/// Inserted into the request's extension map; handlers extract it with
/// `Extension<AuthContext>` and scope every read by `tenant_id`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Tenant the API key belongs to
    pub tenant_id: Uuid,

    pub api_key_id: Uuid,

    /// Label given to the key when it was issued
    pub key_name: String,
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Look up an active key with that hash
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
///
/// # Headers
///
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::InvalidApiKey)?;

    let key = state
        .store
        .find_api_key(&hash_secret(api_key))
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    request.extensions_mut().insert(AuthContext {
        tenant_id: key.tenant_id,
        api_key_id: key.id,
        key_name: key.name,
    });

    Ok(next.run(request).await)
}

//! Tenant resolution from platform shared secrets.
//!
//! Platforms identify the tenant only through the secret they were
//! configured with. Secrets are compared by SHA-256 hash against a globally
//! unique index, so a lookup is a single keyed read whatever the number of
//! tenants.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::{
    models::tenant::{Platform, ResolvedTenant},
    store::{Store, StoreError},
};

/// SHA-256 hex digest of a secret or API key.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Pull the shared secret a delivery presents.
///
/// The platform header wins. Hotmart v1 payloads carried the token as a
/// top-level `hottok` body field instead, so that is accepted as a fallback.
pub fn extract_secret(
    platform: Platform,
    headers: &HeaderMap,
    payload: Option<&serde_json::Value>,
) -> Option<String> {
    let from_header = headers
        .get(platform.secret_header())
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(secret) = from_header {
        return Some(secret.to_string());
    }

    match platform {
        Platform::Hotmart => payload
            .and_then(|p| p.get("hottok"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        Platform::Kiwify => None,
    }
}

/// Resolve which tenant a presented secret belongs to.
///
/// Returns `Ok(None)` for a missing secret or one that matches no *active*
/// credential of this platform. Callers must not reveal which of the two
/// happened.
pub async fn resolve_tenant(
    store: &dyn Store,
    platform: Platform,
    presented_secret: Option<&str>,
) -> Result<Option<ResolvedTenant>, StoreError> {
    let Some(secret) = presented_secret else {
        return Ok(None);
    };

    store
        .find_active_credential(platform, &hash_secret(secret))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn header_takes_precedence_over_body_token() {
        let mut headers = HeaderMap::new();
        headers.insert("x-hotmart-hottok", HeaderValue::from_static("from-header"));
        let body = json!({ "hottok": "from-body" });

        assert_eq!(
            extract_secret(Platform::Hotmart, &headers, Some(&body)).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn hotmart_falls_back_to_body_token() {
        let body = json!({ "hottok": "legacy-token" });

        assert_eq!(
            extract_secret(Platform::Hotmart, &HeaderMap::new(), Some(&body)).as_deref(),
            Some("legacy-token")
        );
    }

    #[test]
    fn kiwify_requires_its_header() {
        let body = json!({ "hottok": "not-for-kiwify" });
        assert_eq!(
            extract_secret(Platform::Kiwify, &HeaderMap::new(), Some(&body)),
            None
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-kiwify-token", HeaderValue::from_static("  "));
        assert_eq!(extract_secret(Platform::Kiwify, &headers, None), None);
    }
}

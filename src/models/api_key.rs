//! API key model for the tenant admin API.
//!
//! API keys are stored as SHA-256 hashes; the plaintext is shown to the
//! tenant once and never persisted.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `tenant_id`: Tenant whose data the key can read
/// - `key_hash`: SHA-256 hash of the actual API key
/// - `name`: Label chosen by the tenant admin
/// - `is_active`: Whether the key is currently valid
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,

    /// Inactive keys are rejected during authentication
    pub is_active: bool,
}

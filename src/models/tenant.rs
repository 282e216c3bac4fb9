//! Tenant and integration credential models.
//!
//! Every CRM record is scoped by a tenant. Inbound webhooks carry no tenant
//! identifier of their own, so the tenant is resolved from the shared secret
//! the sending platform presents (see `services::credential_service`).

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Third-party sales platform that can deliver purchase webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Hotmart,
    Kiwify,
}

impl Platform {
    /// Stored/serialized identifier, also the `/webhooks/{platform}` path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Hotmart => "hotmart",
            Platform::Kiwify => "kiwify",
        }
    }

    /// Human-readable name used in deal notes and loss reasons.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Hotmart => "Hotmart",
            Platform::Kiwify => "Kiwify",
        }
    }

    /// Header carrying the tenant's shared secret.
    pub fn secret_header(&self) -> &'static str {
        match self {
            Platform::Hotmart => "x-hotmart-hottok",
            Platform::Kiwify => "x-kiwify-token",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a platform name is not one we ingest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform `{0}`")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hotmart" => Ok(Platform::Hotmart),
            "kiwify" => Ok(Platform::Kiwify),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = UnknownPlatform;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Commercial plan of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan tier `{0}`")]
pub struct UnknownPlanTier(pub String);

impl TryFrom<String> for PlanTier {
    type Error = UnknownPlanTier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            _ => Err(UnknownPlanTier(value)),
        }
    }
}

/// A company/account boundary.
///
/// Maps to the `tenants` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub plan_tier: PlanTier,

    /// User that owns deals created by integrations (nullable).
    pub owner_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Shared secret a tenant configured for one platform.
///
/// Maps to the `platform_credentials` table. Only the SHA-256 hash of the
/// secret is stored; `secret_hash` is unique across all tenants so a presented
/// secret identifies exactly one tenant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlatformCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[sqlx(try_from = "String")]
    pub platform: Platform,
    pub secret_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Tenant identity established for one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ResolvedTenant {
    pub tenant_id: Uuid,
    pub owner_user_id: Option<Uuid>,
}

impl From<&Tenant> for ResolvedTenant {
    fn from(tenant: &Tenant) -> Self {
        Self {
            tenant_id: tenant.id,
            owner_user_id: tenant.owner_user_id,
        }
    }
}

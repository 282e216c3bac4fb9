//! Deal data models and API response types.
//!
//! This module defines:
//! - `Deal`: Database entity representing a pipeline opportunity
//! - `NewDeal`: Insert payload built by the reconciler
//! - `DealStage` / `DealSource`: the stored enumerations

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::tenant::Platform;

/// Pipeline stage of a deal.
///
/// Manual deals walk `lead → qualification → proposal → negotiation` and end
/// in one of the two closed stages. Webhook deals are born `closed_won`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Lead,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStage::Lead => "lead",
            DealStage::Qualification => "qualification",
            DealStage::Proposal => "proposal",
            DealStage::Negotiation => "negotiation",
            DealStage::ClosedWon => "closed_won",
            DealStage::ClosedLost => "closed_lost",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deal stage `{0}`")]
pub struct UnknownDealStage(pub String);

impl TryFrom<String> for DealStage {
    type Error = UnknownDealStage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "lead" => Ok(DealStage::Lead),
            "qualification" => Ok(DealStage::Qualification),
            "proposal" => Ok(DealStage::Proposal),
            "negotiation" => Ok(DealStage::Negotiation),
            "closed_won" => Ok(DealStage::ClosedWon),
            "closed_lost" => Ok(DealStage::ClosedLost),
            _ => Err(UnknownDealStage(value)),
        }
    }
}

/// Where a deal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DealSource {
    Manual,
    Hotmart,
    Kiwify,
}

impl DealSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealSource::Manual => "manual",
            DealSource::Hotmart => "hotmart",
            DealSource::Kiwify => "kiwify",
        }
    }
}

impl fmt::Display for DealSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Platform> for DealSource {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Hotmart => DealSource::Hotmart,
            Platform::Kiwify => DealSource::Kiwify,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deal source `{0}`")]
pub struct UnknownDealSource(pub String);

impl TryFrom<String> for DealSource {
    type Error = UnknownDealSource;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "manual" => Ok(DealSource::Manual),
            "hotmart" => Ok(DealSource::Hotmart),
            "kiwify" => Ok(DealSource::Kiwify),
            _ => Err(UnknownDealSource(value)),
        }
    }
}

/// Represents a deal record from the database.
///
/// # Database Table
///
/// Maps to the `deals` table. Each deal:
/// - Belongs to one tenant (every query filters by `tenant_id`)
/// - Stores its value as `NUMERIC(14,2)`, never as a float
/// - Carries `external_id` when it was created from a platform purchase
///
/// # Uniqueness
///
/// `(tenant_id, source, external_id)` is unique whenever `external_id` is set.
/// Concurrent deliveries of the same purchase can therefore create at most one
/// deal; the loser of the race observes a duplicate insert.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Deal {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Owning CRM user
    pub user_id: Option<Uuid>,
    pub title: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub value: Decimal,
    #[sqlx(try_from = "String")]
    pub stage: DealStage,

    /// Win probability, 0 to 100
    pub probability: i16,

    /// Originating platform transaction id (webhook deals only)
    pub external_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub source: DealSource,
    pub loss_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// A deal closed as lost by a refund, cancellation or chargeback.
    pub fn is_reversed(&self) -> bool {
        self.stage == DealStage::ClosedLost
    }
}

/// Insert payload for the `deals` table.
#[derive(Debug, Clone)]
pub struct NewDeal {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub value: Decimal,
    pub stage: DealStage,
    pub probability: i16,
    pub external_id: Option<String>,
    pub source: DealSource,
    pub notes: Option<String>,
}

//! Webhook event log models.
//!
//! Every inbound delivery produces exactly one `webhook_events` row, whatever
//! its outcome. Rows are append-only: after insert, only `status`, the outcome
//! fields and the linked deal are ever written.
//!
//! # Status Flow
//!
//! ```text
//! processing ──► success
//!            └─► error
//! ```
//!
//! Deliveries rejected before a tenant is known (bad secret, unknown platform)
//! are inserted directly as `error` with no tenant. A row left at `processing`
//! means the process died mid-request; it is a reconciliation signal, not
//! proof that the event was never applied.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLogStatus {
    Received,
    Processing,
    Success,
    Error,
}

impl EventLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLogStatus::Received => "received",
            EventLogStatus::Processing => "processing",
            EventLogStatus::Success => "success",
            EventLogStatus::Error => "error",
        }
    }
}

impl fmt::Display for EventLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event log status `{0}`")]
pub struct UnknownEventLogStatus(pub String);

impl TryFrom<String> for EventLogStatus {
    type Error = UnknownEventLogStatus;

    fn try_from(value: String) -> Result<Self, UnknownEventLogStatus> {
        match value.as_str() {
            "received" => Ok(EventLogStatus::Received),
            "processing" => Ok(EventLogStatus::Processing),
            "success" => Ok(EventLogStatus::Success),
            "error" => Ok(EventLogStatus::Error),
            _ => Err(UnknownEventLogStatus(value)),
        }
    }
}

/// Webhook delivery record.
///
/// # Database Table
///
/// Maps to the `webhook_events` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct EventLogEntry {
    pub id: Uuid,

    /// Null until the tenant is resolved, and forever for auth failures
    pub tenant_id: Option<Uuid>,

    /// Raw platform path segment; may name a platform we do not support
    pub platform: String,
    pub event_type: Option<String>,
    pub external_id: Option<String>,

    /// Body exactly as received (non-JSON bodies are stored as a JSON string)
    pub payload: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub status: EventLogStatus,
    pub error_message: Option<String>,

    /// Why a successfully handled delivery changed nothing
    pub skip_reason: Option<String>,
    pub deal_id: Option<Uuid>,

    /// Entry this one re-ran, for replays
    pub replayed_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the `webhook_events` table.
#[derive(Debug, Clone)]
pub struct NewEventLogEntry {
    pub tenant_id: Option<Uuid>,
    pub platform: String,
    pub event_type: Option<String>,
    pub payload: serde_json::Value,
    pub status: EventLogStatus,
    pub error_message: Option<String>,
    pub replayed_from: Option<Uuid>,
}

impl NewEventLogEntry {
    /// Entry for a delivery that is about to run through the pipeline.
    pub fn processing(
        tenant_id: Uuid,
        platform: impl Into<String>,
        event_type: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            platform: platform.into(),
            event_type,
            payload,
            status: EventLogStatus::Processing,
            error_message: None,
            replayed_from: None,
        }
    }

    /// Entry for a delivery rejected before any tenant was attributed.
    pub fn rejected(
        platform: impl Into<String>,
        event_type: Option<String>,
        payload: serde_json::Value,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: None,
            platform: platform.into(),
            event_type,
            payload,
            status: EventLogStatus::Error,
            error_message: Some(error_message.into()),
            replayed_from: None,
        }
    }

    pub fn replay_of(mut self, original: Uuid) -> Self {
        self.replayed_from = Some(original);
        self
    }
}

/// Final state written onto a `processing` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogOutcome {
    pub status: EventLogStatus,
    pub event_type: Option<String>,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub skip_reason: Option<String>,
    pub deal_id: Option<Uuid>,
}

impl EventLogOutcome {
    pub fn success() -> Self {
        Self {
            status: EventLogStatus::Success,
            event_type: None,
            external_id: None,
            error_message: None,
            skip_reason: None,
            deal_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: EventLogStatus::Error,
            error_message: Some(message.into()),
            ..Self::success()
        }
    }
}

/// Query parameters for listing a tenant's log.
///
/// # Example
///
/// `GET /api/v1/webhook-events?status=error&limit=20`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventLogFilter {
    pub status: Option<EventLogStatus>,
    pub limit: Option<i64>,
}

impl EventLogFilter {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Requested limit clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let filter = |limit| EventLogFilter {
            status: None,
            limit,
        };
        assert_eq!(filter(None).effective_limit(), 50);
        assert_eq!(filter(Some(0)).effective_limit(), 1);
        assert_eq!(filter(Some(10_000)).effective_limit(), 200);
    }

    #[test]
    fn status_round_trips_through_its_column_text() {
        for status in [
            EventLogStatus::Received,
            EventLogStatus::Processing,
            EventLogStatus::Success,
            EventLogStatus::Error,
        ] {
            assert_eq!(EventLogStatus::try_from(status.to_string()), Ok(status));
        }
        assert_eq!(
            EventLogStatus::try_from("done".to_string()),
            Err(UnknownEventLogStatus("done".to_string()))
        );
    }
}

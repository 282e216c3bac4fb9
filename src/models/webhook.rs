//! Response bodies returned by the webhook receiver and the admin API.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{deal::Deal, sale::Sale};

/// Acknowledgement returned to the sending platform with HTTP 200.
///
/// A duplicate or otherwise skipped delivery is still acknowledged with
/// `success: true`; from the sender's point of view it was handled.
///
/// # Example
///
/// ```json
/// {
///   "success": true,
///   "event": "PURCHASE_APPROVED",
///   "deal_id": "550e8400-e29b-41d4-a716-446655440000"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookAck {
    pub success: bool,

    /// Platform-native event name
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<Uuid>,

    /// Present when the delivery was acknowledged without changing state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// A webhook-created deal together with its mirrored sale, if any.
///
/// `sale: null` on a `closed_won` deal means the mirror write failed and has
/// not been repaired yet.
#[derive(Debug, Serialize)]
pub struct DealLookupResponse {
    pub deal: Deal,
    pub sale: Option<Sale>,
}

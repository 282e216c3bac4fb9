//! Webhook ingestion pipeline.
//!
//! One delivery runs through:
//!
//! ```text
//! received ─► authenticated ─► normalized ─► dedup checked ─► reconciled ─► logged ─► responded
//!     │              │               │               │               │
//!     └──────────────┴───────────────┴───────────────┴───────────────┴──► logged(error) ─► responded(error)
//! ```
//!
//! Every path writes exactly one event log entry and returns exactly one
//! response. Failures map to the sender as:
//!
//! - unknown platform: 404, logged without tenant
//! - bad or missing secret: 401, logged without tenant
//! - payload that does not normalize: 400, logged with the raw body
//! - duplicate, already reversed, pending: 200, logged as success with a skip reason
//! - reversal with no deal: 200, logged as error for review
//! - sale mirror failure: 200 with the deal id, logged as error
//! - storage failure: 500, logged best-effort; the sender retries

use axum::http::HeaderMap;
use serde_json::Value;
use tracing::{Span, field::Empty};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        event_log::{EventLogOutcome, EventLogStatus, NewEventLogEntry},
        purchase::{PurchaseEvent, PurchaseStatus},
        tenant::{Platform, ResolvedTenant},
        webhook::WebhookAck,
    },
    services::{
        credential_service,
        dedup_gate::{self, Decision, SkipReason},
        event_log,
        normalizer::{self, ParseError},
        reconciler::{self, Reconciled, SaleMirror},
    },
    store::{Store, StoreError},
};

/// Receive one webhook delivery.
///
/// `platform_segment` is the raw `/webhooks/{platform}` path segment and
/// `body` the request body exactly as received.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(platform = %platform_segment, tenant_id = Empty, transaction_id = Empty)
)]
pub async fn ingest(
    store: &dyn Store,
    platform_segment: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookAck, AppError> {
    let parsed = normalizer::parse_body(body);
    let raw_payload = match &parsed {
        Ok(value) => value.clone(),
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    };

    let platform = match platform_segment.parse::<Platform>() {
        Ok(platform) => platform,
        Err(e) => {
            tracing::warn!("webhook for unknown platform");
            event_log::record_rejection(
                store,
                NewEventLogEntry::rejected(platform_segment, None, raw_payload, e.to_string()),
            )
            .await;
            return Err(AppError::UnknownPlatform(platform_segment.to_string()));
        }
    };

    let event_type = parsed
        .as_ref()
        .ok()
        .and_then(|payload| normalizer::event_type_hint(platform, payload));
    let secret = credential_service::extract_secret(platform, headers, parsed.as_ref().ok());

    let tenant =
        match credential_service::resolve_tenant(store, platform, secret.as_deref()).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                tracing::warn!(
                    secret_present = secret.is_some(),
                    "webhook secret matched no active credential"
                );
                event_log::record_rejection(
                    store,
                    NewEventLogEntry::rejected(
                        platform.as_str(),
                        event_type,
                        raw_payload,
                        "invalid or missing webhook secret",
                    ),
                )
                .await;
                return Err(AppError::Unauthenticated);
            }
            Err(e) => {
                event_log::record_rejection(
                    store,
                    NewEventLogEntry::rejected(
                        platform.as_str(),
                        event_type,
                        raw_payload,
                        format!("tenant resolution failed: {e}"),
                    ),
                )
                .await;
                return Err(e.into());
            }
        };
    Span::current().record("tenant_id", tracing::field::display(tenant.tenant_id));

    let entry = event_log::begin(
        store,
        NewEventLogEntry::processing(tenant.tenant_id, platform.as_str(), event_type, raw_payload),
    )
    .await?;

    process(store, &tenant, platform, parsed, entry.id).await
}

/// Re-run a logged delivery for its tenant.
///
/// The stored payload goes through the normal pipeline under a new entry
/// pointing back at the original; the original entry is left as it was.
#[tracing::instrument(
    name = "webhook_replay",
    skip_all,
    fields(tenant_id = %tenant_id, entry_id = %entry_id, platform = Empty, transaction_id = Empty)
)]
pub async fn replay(
    store: &dyn Store,
    tenant_id: Uuid,
    entry_id: Uuid,
) -> Result<WebhookAck, AppError> {
    let original = event_log::get(store, tenant_id, entry_id)
        .await?
        .ok_or(AppError::NotFound("Webhook event"))?;

    let platform = original
        .platform
        .parse::<Platform>()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;
    Span::current().record("platform", platform.as_str());

    let tenant = store
        .get_tenant(tenant_id)
        .await?
        .map(|t| ResolvedTenant::from(&t))
        .ok_or(AppError::NotFound("Tenant"))?;

    let payload = original.payload;
    let entry = event_log::begin(
        store,
        NewEventLogEntry::processing(
            tenant_id,
            platform.as_str(),
            original.event_type,
            payload.clone(),
        )
        .replay_of(original.id),
    )
    .await?;

    tracing::info!(replay_entry_id = %entry.id, "replaying webhook event");
    process(store, &tenant, platform, Ok(payload), entry.id).await
}

/// Normalize, gate and reconcile one payload, finishing the log entry.
async fn process(
    store: &dyn Store,
    tenant: &ResolvedTenant,
    platform: Platform,
    parsed: Result<Value, ParseError>,
    entry_id: Uuid,
) -> Result<WebhookAck, AppError> {
    let event = match parsed.and_then(|payload| normalizer::normalize(platform, &payload)) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "malformed webhook payload");
            event_log::finish(
                store,
                entry_id,
                &EventLogOutcome::error(format!("malformed payload: {e}")),
            )
            .await;
            return Err(AppError::MalformedPayload(e.to_string()));
        }
    };
    Span::current().record("transaction_id", event.transaction_id.as_str());

    match apply(store, tenant, &event).await {
        Ok((reconciled, repair)) => {
            let (outcome, ack) = settle(&event, reconciled, repair);
            event_log::finish(store, entry_id, &outcome).await;
            Ok(ack)
        }
        Err(e) => {
            let outcome = EventLogOutcome {
                event_type: Some(event.event_type.clone()),
                external_id: Some(event.transaction_id.clone()),
                ..EventLogOutcome::error(format!("internal error: {e}"))
            };
            event_log::finish(store, entry_id, &outcome).await;
            Err(e.into())
        }
    }
}

async fn apply(
    store: &dyn Store,
    tenant: &ResolvedTenant,
    event: &PurchaseEvent,
) -> Result<(Reconciled, Option<SaleMirror>), StoreError> {
    let reconciled = match dedup_gate::should_process(store, tenant.tenant_id, event).await? {
        Decision::Create => reconciler::apply_approval(store, tenant, event).await?,
        Decision::Reverse { .. } => {
            let Some(reason) = event.loss_reason() else {
                return Ok((Reconciled::Skipped(SkipReason::NonActionable), None));
            };
            reconciler::apply_reversal(store, tenant, event, &reason).await?
        }
        Decision::Skip(reason) => Reconciled::Skipped(reason),
    };

    // A redelivered approval is the retry path for a sale mirror that failed before
    let repair = match reconciled {
        Reconciled::Skipped(SkipReason::Duplicate { deal_id })
            if event.status == PurchaseStatus::Approved =>
        {
            reconciler::ensure_sale_mirror(store, tenant, deal_id, event).await?
        }
        _ => None,
    };

    Ok((reconciled, repair))
}

/// Log outcome and sender acknowledgement for a reconciled event.
fn settle(
    event: &PurchaseEvent,
    reconciled: Reconciled,
    repair: Option<SaleMirror>,
) -> (EventLogOutcome, WebhookAck) {
    let mut outcome = EventLogOutcome {
        event_type: Some(event.event_type.clone()),
        external_id: Some(event.transaction_id.clone()),
        ..EventLogOutcome::success()
    };
    let mut ack = WebhookAck {
        success: true,
        event: event.event_type.clone(),
        deal_id: None,
        skipped: None,
    };

    match reconciled {
        Reconciled::Created { deal_id, sale } => {
            outcome.deal_id = Some(deal_id);
            ack.deal_id = Some(deal_id);
            if let SaleMirror::Failed(message) = sale {
                outcome.status = EventLogStatus::Error;
                outcome.error_message = Some(format!("sale mirror failed: {message}"));
            }
        }
        Reconciled::Reversed { deal_id } => {
            outcome.deal_id = Some(deal_id);
            ack.deal_id = Some(deal_id);
        }
        Reconciled::Skipped(reason) => {
            tracing::info!(skip_reason = %reason, "webhook acknowledged without changes");
            outcome.deal_id = reason.deal_id();
            outcome.skip_reason = Some(reason.as_str().to_string());
            ack.deal_id = reason.deal_id();
            ack.skipped = Some(reason.as_str().to_string());

            if reason.needs_review() {
                tracing::warn!("reversal for unknown transaction, flagged for review");
                outcome.status = EventLogStatus::Error;
                outcome.error_message = Some(reason.as_str().to_string());
            }
        }
    }

    match repair {
        Some(SaleMirror::Failed(message)) => {
            outcome.status = EventLogStatus::Error;
            outcome.error_message = Some(format!("sale mirror repair failed: {message}"));
        }
        Some(SaleMirror::Created(sale_id)) => {
            tracing::info!(%sale_id, "missing sale mirror repaired");
        }
        Some(SaleMirror::Existing(_)) | None => {}
    }

    (outcome, ack)
}

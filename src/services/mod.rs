//! Business logic layer.
//!
//! Services hold the ingestion pipeline and are called by HTTP handlers.
//! They talk to persistence only through the [`crate::store::Store`] trait.

/// Tenant resolution from platform shared secrets
pub mod credential_service;

/// Idempotency and ordering decisions
pub mod dedup_gate;

/// Webhook event log recording and queries
pub mod event_log;

/// Composition of the full webhook pipeline
pub mod ingest_service;

/// Platform payload mapping into purchase events
pub mod normalizer;

/// Deal and sale writes
pub mod reconciler;

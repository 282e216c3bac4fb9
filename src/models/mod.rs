//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the normalized in-memory purchase event.

/// Admin API key model
pub mod api_key;
/// Pipeline deal model
pub mod deal;
/// Webhook delivery log model
pub mod event_log;
/// Normalized purchase event
pub mod purchase;
/// Sales ledger model
pub mod sale;
/// Tenant, platform and credential models
pub mod tenant;
/// Webhook and admin API response bodies
pub mod webhook;

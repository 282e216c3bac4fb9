//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (raw body, URL params, auth context)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Webhook-created deal lookup
pub mod deals;

/// Webhook delivery audit and replay
pub mod event_log;

/// Service health
pub mod health;

/// Inbound platform webhooks
pub mod webhooks;

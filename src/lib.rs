//! Webhook-driven deal and sale ingestion for a multi-tenant sales CRM.
//!
//! Sales platforms (Hotmart, Kiwify) post purchase lifecycle events. Each
//! delivery is attributed to a tenant by its shared secret, normalized into a
//! [`models::purchase::PurchaseEvent`], checked against what was already
//! applied, and reconciled into `deals` and `vendas` rows. Every delivery is
//! recorded in an append-only event log.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, behind the [`store::Store`] trait
//! - **Authentication**: platform shared secrets and admin API keys, both
//!   stored as SHA-256 hashes
//! - **Format**: JSON requests/responses

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

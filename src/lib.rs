//! Consult Portal API Library
//!
//! Backend for a healthcare consulting portal: appointment booking with
//! hosted checkout, payment webhook reconciliation, a sandbox ACH flow,
//! consultation intake with notification email, an LLM chat assistant and
//! the customer/admin endpoints around them.
//!
//! # Modules
//!
//! - `api`: HTTP-facing handlers.
//! - `core`: Workflows, models and errors.
//! - `integrations`: External provider clients.
//! - `ach`: Three-step ACH flow.
//! - `assistant`: Chat sessions and document analysis.
//! - `auth`: Bearer-token extractors and role resolution.
//! - `booking`: Booking state machine.
//! - `circuit_breaker`: Circuit breaker for outgoing email.
//! - `config`: Configuration management.
//! - `consultations`: Consultation intake.
//! - `dashboard`: Customer dashboard lists and admin analytics.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Postgres implementation of `Store`.
//! - `errors`: Error handling types.
//! - `guards`: Route guard decisions.
//! - `handlers`: HTTP request handlers.
//! - `memory_store`: In-process `Store` for tests and demos.
//! - `models`: Core data models.
//! - `notifications`: Fire-and-forget notification email.
//! - `password_check`: Breached-password lookup.
//! - `payments`: Checkout-session orchestrator.
//! - `routes`: Router assembly and API docs.
//! - `session`: Session context with subscribe/dispose lifecycle.
//! - `store`: Storage trait.
//! - `sweeper`: Orphaned booking cleanup.
//! - `webhook_handler`: Payment webhook reconciliation.
//! - `webhook_models`: Payment event payloads.
//! - `webhook_signature`: Webhook signature verification.

pub mod api;
pub mod core;
pub mod integrations;

pub mod ach;
pub mod assistant;
pub mod auth;
pub mod booking;
pub mod circuit_breaker;
pub mod config;
pub mod consultations;
pub mod dashboard;
pub mod db;
pub mod db_storage;
pub mod dwolla_client;
pub mod email_client;
pub mod errors;
pub mod guards;
pub mod handlers;
pub mod identity_client;
pub mod llm_client;
pub mod memory_store;
pub mod models;
pub mod notifications;
pub mod password_check;
pub mod payments;
pub mod routes;
pub mod session;
pub mod store;
pub mod stripe_client;
pub mod sweeper;
pub mod webhook_handler;
pub mod webhook_models;
pub mod webhook_signature;

//! Personal todo list: an actix-web service whose routes authenticate the
//! caller and forward owner-scoped reads and writes to a hosted backend
//! (Supabase, or an in-memory stand-in), plus a headless client view that
//! keeps a local copy of the list in step with the service.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod server;
pub mod telemetry;

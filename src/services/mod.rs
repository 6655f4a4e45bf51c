//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own sessions, gating, auth providers, document storage and
//! record validation so route handlers can stay focused on protocol
//! translation.

pub mod admin;
pub mod auth;
pub mod gate;
pub mod identity_toolkit;
pub mod login;
pub mod pg_store;
pub mod records;
pub mod session;
pub mod store;

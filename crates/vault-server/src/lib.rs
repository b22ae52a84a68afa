//! # vault-server
//!
//! HTTP API for passvault. Routes requests through the access gate and into
//! the owner-scoped credential store, with JSON envelopes on the way out.

pub mod error;
mod handlers;
mod server;

pub use error::ApiError;
pub use server::{AppState, SharedState, VaultServer};

//! Authenticated REST access to the configured API.

pub mod client;

pub use client::{ApiClient, ApiResponse};

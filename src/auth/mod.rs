//! OAuth2 credential lifecycle
//!
//! This module owns everything between "the user wants to log in" and
//! "here is a valid bearer token for this request": the interactive
//! authorization-code flow, the loopback callback listener, refresh, and
//! on-disk persistence.
//!
//! # Module Layout
//!
//! - [`flow`]        -- Authorization-code flow: browser hand-off, state
//!   nonce, code exchange
//! - [`listener`]    -- Loopback HTTP listener with exactly-once callback
//!   settlement
//! - [`manager`]     -- High-level token manager coordinating all
//!   sub-modules
//! - [`token_store`] -- Atomic token persistence on the local filesystem

pub mod flow;
pub mod listener;
pub mod manager;
pub mod token_store;

pub use flow::{AuthFlow, FlowConfig, SystemUrlOpener, UrlOpener};
pub use listener::{CallbackListener, CallbackOutcome};
pub use manager::{Mode, TokenManager};
pub use token_store::{FileTokenStore, TokenRecord, DEFAULT_EXPIRY_BUFFER};

/// Time source for expiry decisions, injectable for tests.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

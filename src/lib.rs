//! SNIPERFI - encrypted wallet-fleet custody and distribution
//!
//! Manages one parent funding wallet plus a fleet of child wallets,
//! persists private keys encrypted at rest, funds children from the
//! parent, and dispatches batched token buys across the fleet.

pub mod cli;
pub mod config;
pub mod custody;
pub mod dispatch;
pub mod error;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};

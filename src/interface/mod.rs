//! Interface layer - Boundaries the core is driven through
//!
//! This layer handles:
//! - Platform call registry callbacks (`platform`)
//! - The consuming application's API (`app_bridge`)
//!
//! Neither boundary propagates errors: failures are logged here and surface
//! as `false` or `None`.

pub mod app_bridge;
pub mod platform;

pub use app_bridge::{ApplicationBridge, SessionView};
pub use platform::{PlatformAdapter, PlatformSession, SessionCallbacks};

use crate::domain::shared::error::DomainError;
use tracing::{error, warn};

/// Log an operation failure and turn the result into an `Option`
pub(crate) fn settle<T>(operation: &str, result: Result<T, DomainError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_benign() => {
            warn!("{} ignored: {}", operation, e);
            None
        }
        Err(e) => {
            error!("{} failed: {}", operation, e);
            None
        }
    }
}

pub(crate) fn succeeded(operation: &str, result: Result<(), DomainError>) -> bool {
    settle(operation, result).is_some()
}

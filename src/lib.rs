//! callkeep-core - Call session management for device-hosted calling UI
//!
//! A Domain-Driven Design implementation that tracks call sessions reported
//! by the platform call registry, relays their lifecycle events to an
//! application that may not be listening yet, and wakes that application
//! when it fails to confirm it is alive.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use application::{CallSessionManager, NewSession};
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;

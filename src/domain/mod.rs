//! Domain layer - Core call session rules
//!
//! This layer contains:
//! - The session aggregate and its state machine
//! - The session store and conference grouping
//! - Application-facing lifecycle events
//! - Ports for the collaborators the core drives

pub mod ports;
pub mod session;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};

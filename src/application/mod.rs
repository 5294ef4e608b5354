//! Application layer - Use cases over call sessions
//!
//! This layer orchestrates the domain and the infrastructure services:
//! - Creating and tearing down sessions
//! - Publishing lifecycle events after each transition
//! - Keeping the presence indicator and reachability watchdog in step

pub mod context;
pub mod session_manager;

pub use context::{Collaborators, SessionContext};
pub use session_manager::{CallSessionManager, NewSession};

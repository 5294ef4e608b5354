//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The event relay and its delivery loop
//! - The reachability watchdog
//! - The presence coordinator
//! - Tracing-backed collaborator adapters
//! - Metrics helpers

pub mod collaborators;
pub mod metrics;
pub mod presence;
pub mod relay;
pub mod watchdog;

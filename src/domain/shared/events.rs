//! Domain events infrastructure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and timing shared by everything the relay carries
pub trait DomainEvent: Send + Sync {
    /// Wire name, e.g. `answered`
    fn event_type(&self) -> &'static str;

    fn event_id(&self) -> Uuid;

    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Stamped on an event when it is emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

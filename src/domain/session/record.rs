//! Session record - the data half of a call session

use crate::domain::session::value_object::{
    attr, Attributes, AudioRoute, Direction, DisconnectCause, SessionState,
};
use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one call as seen by the store and the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub direction: Direction,
    pub state: SessionState,
    pub attributes: Attributes,
    pub muted: bool,
    pub audio_route: Option<AudioRoute>,
    /// Set while the reachability watchdog is armed for this session
    pub awaiting_reachability: bool,
    pub conference: Option<ConferenceId>,
    /// Set by the terminal transition
    pub disconnect_cause: Option<DisconnectCause>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: SessionId, direction: Direction, attributes: Attributes) -> Self {
        Self {
            id,
            direction,
            state: SessionState::Initializing,
            attributes,
            muted: false,
            audio_route: None,
            awaiting_reachability: false,
            conference: None,
            disconnect_cause: None,
            created_at: Utc::now(),
        }
    }

    pub fn caller_number(&self) -> Option<&String> {
        self.attributes.get(attr::NUMBER)
    }

    pub fn caller_name(&self) -> Option<&String> {
        self.attributes.get(attr::NAME).filter(|name| !name.is_empty())
    }

    pub fn has_video(&self) -> bool {
        self.attributes
            .get(attr::HAS_VIDEO)
            .map(|v| matches!(v.as_str(), "true" | "1"))
            .unwrap_or(false)
    }

    /// Merge new attributes over the existing ones. Keys are only ever
    /// overwritten, never dropped.
    pub fn merge_attributes(&mut self, attributes: Attributes) {
        self.attributes.extend(attributes);
    }
}

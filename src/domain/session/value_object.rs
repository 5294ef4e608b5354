//! Session value objects

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// String attributes attached to a session (caller number, name, video flag,
/// custom payload). Merged on update, never cleared wholesale.
pub type Attributes = BTreeMap<String, String>;

/// Well-known attribute keys
pub mod attr {
    pub const NUMBER: &str = "number";
    pub const NAME: &str = "name";
    pub const HAS_VIDEO: &str = "hasVideo";
    pub const PAYLOAD: &str = "payload";
}

/// Session direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Record allocated, platform has not reported anything yet
    Initializing,
    /// Incoming call is alerting
    Ringing,
    /// Outgoing call is being placed
    Dialing,
    /// Call is connected
    Active,
    /// Call is on hold
    Held,
    /// Local hangup requested by the application, waiting for the platform
    Disconnecting,
    /// Terminal
    Disconnected,
}

impl SessionState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: SessionState) -> bool {
        use SessionState::*;

        match (self, new_state) {
            (Initializing, Ringing) => true,
            (Initializing, Dialing) => true,
            (Initializing, Disconnected) => true,

            (Ringing, Active) => true,
            (Dialing, Active) => true,

            (Active, Held) => true,
            (Held, Active) => true,

            (Ringing | Dialing | Active | Held, Disconnecting) => true,
            (Ringing | Dialing | Active | Held | Disconnecting, Disconnected) => true,

            // Can't transition from Disconnected
            (Disconnected, _) => false,

            _ => false,
        }
    }

    /// Anything not terminal counts towards the presence indicator
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }

    /// Connected states, the only ones that can join a conference
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Held)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Ringing => "ringing",
            SessionState::Dialing => "dialing",
            SessionState::Active => "active",
            SessionState::Held => "held",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended, as reported by the application or platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    Local,
    Remote,
    Busy,
    Error,
    AnsweredElsewhere,
    Missed,
    Rejected,
}

impl DisconnectReason {
    /// Map a numeric end-call reason code. Unknown codes fall back to `Local`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => DisconnectReason::Error,
            2 => DisconnectReason::Remote,
            3 => DisconnectReason::Busy,
            4 => DisconnectReason::AnsweredElsewhere,
            5 => DisconnectReason::Rejected,
            6 => DisconnectReason::Missed,
            _ => DisconnectReason::Local,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            DisconnectReason::Local => 0,
            DisconnectReason::Error => 1,
            DisconnectReason::Remote => 2,
            DisconnectReason::Busy => 3,
            DisconnectReason::AnsweredElsewhere => 4,
            DisconnectReason::Rejected => 5,
            DisconnectReason::Missed => 6,
        }
    }

    pub fn cause(&self) -> DisconnectCause {
        DisconnectCause::from(*self)
    }
}

/// Normalized cause handed back to the platform call registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectCause {
    Local,
    Remote,
    Busy,
    Error,
    AnsweredElsewhere,
    Missed,
    Rejected,
}

impl From<DisconnectReason> for DisconnectCause {
    fn from(reason: DisconnectReason) -> Self {
        match reason {
            DisconnectReason::Local => DisconnectCause::Local,
            DisconnectReason::Remote => DisconnectCause::Remote,
            DisconnectReason::Busy => DisconnectCause::Busy,
            DisconnectReason::Error => DisconnectCause::Error,
            DisconnectReason::AnsweredElsewhere => DisconnectCause::AnsweredElsewhere,
            DisconnectReason::Missed => DisconnectCause::Missed,
            DisconnectReason::Rejected => DisconnectCause::Rejected,
        }
    }
}

/// Audio output route, exposed as data only
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRoute {
    Earpiece,
    Speaker,
    Bluetooth,
    WiredHeadset,
    Other(String),
}

impl AudioRoute {
    pub fn as_str(&self) -> &str {
        match self {
            AudioRoute::Earpiece => "earpiece",
            AudioRoute::Speaker => "speaker",
            AudioRoute::Bluetooth => "bluetooth",
            AudioRoute::WiredHeadset => "wired_headset",
            AudioRoute::Other(name) => name,
        }
    }
}

impl fmt::Display for AudioRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio state reported by the platform with each audio callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioState {
    pub muted: bool,
    pub route: AudioRoute,
}

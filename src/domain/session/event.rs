//! Session lifecycle events delivered to the consuming application

use crate::domain::session::value_object::DisconnectReason;
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Union of all events the application can observe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CallEvent {
    /// Outgoing session created, the application should place the call
    #[serde(rename_all = "camelCase")]
    StartCall {
        session_id: SessionId,
        handle: Option<String>,
        name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ShowIncomingCallUi {
        session_id: SessionId,
        handle: Option<String>,
        name: Option<String>,
        has_video: bool,
    },
    #[serde(rename_all = "camelCase")]
    IncomingConnectionFailed {
        session_id: SessionId,
        handle: Option<String>,
        name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SilenceIncomingCall {
        session_id: SessionId,
        handle: Option<String>,
        name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Answered { session_id: SessionId, with_video: bool },
    AudioSessionActivated,
    #[serde(rename_all = "camelCase")]
    Held { session_id: SessionId, hold: bool },
    #[serde(rename_all = "camelCase")]
    Muted { session_id: SessionId, muted: bool },
    #[serde(rename_all = "camelCase")]
    Dtmf { session_id: SessionId, digit: char },
    #[serde(rename_all = "camelCase")]
    AudioRouteChanged { session_id: SessionId, route: String },
    #[serde(rename_all = "camelCase")]
    Disconnected {
        session_id: SessionId,
        reason: DisconnectReason,
    },
    ReachabilityCheck,
    #[serde(rename_all = "camelCase")]
    WakeApplication {
        session_id: SessionId,
        caller_number: Option<String>,
        caller_name: Option<String>,
    },
}

impl CallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::StartCall { .. } => "startCall",
            CallEvent::ShowIncomingCallUi { .. } => "showIncomingCallUi",
            CallEvent::IncomingConnectionFailed { .. } => "incomingConnectionFailed",
            CallEvent::SilenceIncomingCall { .. } => "silenceIncomingCall",
            CallEvent::Answered { .. } => "answered",
            CallEvent::AudioSessionActivated => "audioSessionActivated",
            CallEvent::Held { .. } => "held",
            CallEvent::Muted { .. } => "muted",
            CallEvent::Dtmf { .. } => "dtmf",
            CallEvent::AudioRouteChanged { .. } => "audioRouteChanged",
            CallEvent::Disconnected { .. } => "disconnected",
            CallEvent::ReachabilityCheck => "reachabilityCheck",
            CallEvent::WakeApplication { .. } => "wakeApplication",
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            CallEvent::StartCall { session_id, .. }
            | CallEvent::ShowIncomingCallUi { session_id, .. }
            | CallEvent::IncomingConnectionFailed { session_id, .. }
            | CallEvent::SilenceIncomingCall { session_id, .. }
            | CallEvent::Answered { session_id, .. }
            | CallEvent::Held { session_id, .. }
            | CallEvent::Muted { session_id, .. }
            | CallEvent::Dtmf { session_id, .. }
            | CallEvent::AudioRouteChanged { session_id, .. }
            | CallEvent::Disconnected { session_id, .. }
            | CallEvent::WakeApplication { session_id, .. } => Some(session_id),
            CallEvent::AudioSessionActivated | CallEvent::ReachabilityCheck => None,
        }
    }

    /// Whether the relay keeps this event while no listener is attached.
    /// Pings that only make sense in the moment are dropped instead.
    pub fn retry_if_undelivered(&self) -> bool {
        !matches!(
            self,
            CallEvent::AudioSessionActivated | CallEvent::ReachabilityCheck
        )
    }

    /// Flattened string payload, keyed the way the application expects
    pub fn payload(&self) -> BTreeMap<String, String> {
        let mut payload = BTreeMap::new();
        if let Some(id) = self.session_id() {
            payload.insert("sessionId".to_string(), id.to_string());
        }

        let mut put = |key: &str, value: Option<&String>| {
            if let Some(value) = value {
                payload.insert(key.to_string(), value.clone());
            }
        };

        match self {
            CallEvent::StartCall { handle, name, .. }
            | CallEvent::IncomingConnectionFailed { handle, name, .. }
            | CallEvent::SilenceIncomingCall { handle, name, .. } => {
                put("handle", handle.as_ref());
                put("name", name.as_ref());
            }
            CallEvent::ShowIncomingCallUi {
                handle,
                name,
                has_video,
                ..
            } => {
                put("handle", handle.as_ref());
                put("name", name.as_ref());
                put("hasVideo", Some(&has_video.to_string()));
            }
            CallEvent::Answered { with_video, .. } => {
                put("withVideo", Some(&with_video.to_string()));
            }
            CallEvent::Held { hold, .. } => put("hold", Some(&hold.to_string())),
            CallEvent::Muted { muted, .. } => put("muted", Some(&muted.to_string())),
            CallEvent::Dtmf { digit, .. } => put("digit", Some(&digit.to_string())),
            CallEvent::AudioRouteChanged { route, .. } => put("route", Some(route)),
            CallEvent::Disconnected { reason, .. } => {
                put("reason", Some(&reason.code().to_string()));
            }
            CallEvent::WakeApplication {
                caller_number,
                caller_name,
                ..
            } => {
                put("callerNumber", caller_number.as_ref());
                put("callerName", caller_name.as_ref());
            }
            CallEvent::AudioSessionActivated | CallEvent::ReachabilityCheck => {}
        }

        payload
    }
}

/// Event as it travels through the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub metadata: EventMetadata,
    pub event: CallEvent,
}

impl EventEnvelope {
    pub fn new(event: CallEvent) -> Self {
        Self {
            metadata: EventMetadata::new(),
            event,
        }
    }
}

impl DomainEvent for EventEnvelope {
    fn event_type(&self) -> &'static str {
        self.event.name()
    }

    fn event_id(&self) -> Uuid {
        self.metadata.event_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata.occurred_at
    }
}

/// Buffered event in the shape an application pulls on cold start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvent {
    pub name: String,
    pub payload: BTreeMap<String, String>,
    pub retry_if_undelivered: bool,
}

impl From<&CallEvent> for PendingEvent {
    fn from(event: &CallEvent) -> Self {
        Self {
            name: event.name().to_string(),
            payload: event.payload(),
            retry_if_undelivered: event.retry_if_undelivered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answered_payload() {
        let event = CallEvent::Answered {
            session_id: SessionId::new("A"),
            with_video: false,
        };

        let payload = event.payload();
        assert_eq!(event.name(), "answered");
        assert_eq!(payload.get("sessionId").map(String::as_str), Some("A"));
        assert_eq!(payload.get("withVideo").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_pings_are_not_retryable() {
        assert!(!CallEvent::ReachabilityCheck.retry_if_undelivered());
        assert!(!CallEvent::AudioSessionActivated.retry_if_undelivered());
        assert!(CallEvent::Disconnected {
            session_id: SessionId::new("A"),
            reason: DisconnectReason::Local,
        }
        .retry_if_undelivered());
    }

    #[test]
    fn test_wake_payload_skips_missing_attributes() {
        let event = CallEvent::WakeApplication {
            session_id: SessionId::new("B"),
            caller_number: Some("+15551234".to_string()),
            caller_name: None,
        };

        let pending = PendingEvent::from(&event);
        assert_eq!(pending.name, "wakeApplication");
        assert_eq!(pending.payload.len(), 2);
        assert!(!pending.payload.contains_key("callerName"));
    }

    #[test]
    fn test_serialized_shape_is_tagged_by_event() {
        let event = CallEvent::Held {
            session_id: SessionId::new("A"),
            hold: true,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "held");
        assert_eq!(json["sessionId"], "A");
        assert_eq!(json["hold"], true);
    }

    #[test]
    fn test_envelopes_are_stamped_individually() {
        let first = EventEnvelope::new(CallEvent::ReachabilityCheck);
        let second = EventEnvelope::new(CallEvent::ReachabilityCheck);

        assert_eq!(first.event_type(), "reachabilityCheck");
        assert_ne!(first.event_id(), second.event_id());
        assert!(first.occurred_at() <= second.occurred_at());
    }

    #[test]
    fn test_caller_name_field_survives_serialization() {
        let event = CallEvent::StartCall {
            session_id: SessionId::new("B"),
            handle: Some("100".to_string()),
            name: Some("Ann".to_string()),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["name"], "Ann");
        assert_eq!(json["handle"], "100");

        let back: CallEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

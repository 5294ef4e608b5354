//! Application bridge
//!
//! The API the consuming application talks to: event subscription, the
//! cold-start backlog, liveness confirmation and call control. Ids arrive as
//! plain strings and every call answers with a boolean, a count or a view.

use crate::application::{CallSessionManager, NewSession};
use crate::domain::session::event::PendingEvent;
use crate::domain::session::record::SessionRecord;
use crate::domain::session::value_object::{DisconnectReason, SessionState};
use crate::domain::shared::value_objects::SessionId;
use crate::infrastructure::relay::{EventStream, Listener};
use crate::interface::{settle, succeeded};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Session as reported to the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub direction: String,
    pub state: String,
    pub caller_number: Option<String>,
    pub caller_name: Option<String>,
    pub has_video: bool,
    pub muted: bool,
    pub audio_route: Option<String>,
    pub conference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SessionRecord> for SessionView {
    fn from(record: SessionRecord) -> Self {
        SessionView {
            direction: format!("{:?}", record.direction).to_lowercase(),
            state: record.state.as_str().to_string(),
            caller_number: record.caller_number().cloned(),
            caller_name: record.caller_name().cloned(),
            has_video: record.has_video(),
            muted: record.muted,
            audio_route: record.audio_route.as_ref().map(|r| r.to_string()),
            conference_id: record.conference.map(|c| c.to_string()),
            created_at: record.created_at,
            session_id: record.id.to_string(),
        }
    }
}

/// Call details supplied by the application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub session_id: Option<String>,
    pub handle: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub has_video: bool,
}

impl CallRequest {
    fn into_new_session(self) -> NewSession {
        let mut session = NewSession::new().with_video(self.has_video);
        if let Some(id) = self.session_id {
            session = session.with_id(id);
        }
        if let Some(handle) = self.handle {
            session = session.with_number(handle);
        }
        if let Some(name) = self.name {
            session = session.with_name(name);
        }
        session
    }
}

#[derive(Clone)]
pub struct ApplicationBridge {
    manager: Arc<CallSessionManager>,
}

impl ApplicationBridge {
    pub fn new(manager: Arc<CallSessionManager>) -> Self {
        Self { manager }
    }

    /// Attach a fresh listener and replay whatever was buffered before it
    pub async fn subscribe(&self) -> EventStream {
        self.manager.relay().subscribe().await
    }

    pub fn attach_listener(&self, listener: Listener) {
        self.manager.relay().attach_listener(listener);
    }

    pub async fn flush_events(&self) -> usize {
        self.manager.relay().flush().await
    }

    pub fn detach_listener(&self) {
        self.manager.relay().detach_listener();
    }

    /// Pull the buffered backlog instead of listening; clears it
    pub async fn get_initial_events(&self) -> Vec<PendingEvent> {
        self.manager.relay().drain().await
    }

    pub fn clear_initial_events(&self) {
        self.manager.relay().clear();
    }

    /// The application is up and handling events
    pub fn confirm_reachable(&self) -> usize {
        self.manager.confirm_reachable()
    }

    pub fn mark_unreachable(&self) {
        info!("Application reported itself unreachable");
        self.manager.mark_unreachable();
    }

    pub fn display_incoming_call(&self, request: CallRequest) -> Option<String> {
        settle(
            "displayIncomingCall",
            self.manager.create_incoming(request.into_new_session()),
        )
        .map(|id| id.to_string())
    }

    pub fn start_call(&self, request: CallRequest) -> Option<String> {
        settle(
            "startCall",
            self.manager.create_outgoing(request.into_new_session()),
        )
        .map(|id| id.to_string())
    }

    pub fn answer_incoming_call(&self, session_id: &str) -> bool {
        succeeded("answerIncomingCall", self.manager.answer(&id(session_id)))
    }

    pub fn reject_call(&self, session_id: &str) -> bool {
        succeeded("rejectCall", self.manager.reject(&id(session_id), None))
    }

    pub fn end_call(&self, session_id: &str) -> bool {
        succeeded(
            "endCall",
            self.manager
                .disconnect(&id(session_id), DisconnectReason::Local),
        )
    }

    /// End a call with one of the reason codes the application knows
    pub fn report_end_call_with_reason(&self, session_id: &str, code: i32) -> bool {
        succeeded(
            "reportEndCallWithReason",
            self.manager
                .disconnect(&id(session_id), DisconnectReason::from_code(code)),
        )
    }

    pub fn end_all_calls(&self) -> usize {
        self.manager.end_all_calls()
    }

    pub fn set_current_call_active(&self, session_id: &str) -> bool {
        succeeded(
            "setCurrentCallActive",
            self.manager.set_current_call_active(&id(session_id)),
        )
    }

    pub fn set_session_state(&self, session_id: &str, state: SessionState) -> bool {
        succeeded(
            "setSessionState",
            self.manager.set_session_state(&id(session_id), state),
        )
    }

    pub fn set_muted(&self, session_id: &str, muted: bool) -> bool {
        succeeded("setMutedCall", self.manager.mute(&id(session_id), muted))
    }

    pub fn set_on_hold(&self, session_id: &str, hold: bool) -> bool {
        succeeded("setOnHold", self.manager.set_on_hold(&id(session_id), hold))
    }

    /// Send a DTMF sequence; stops at the first rejected digit
    pub fn send_dtmf(&self, session_id: &str, digits: &str) -> bool {
        let id = id(session_id);
        digits
            .chars()
            .all(|digit| succeeded("sendDTMF", self.manager.send_digit(&id, digit)))
    }

    pub fn update_display(&self, session_id: &str, name: Option<String>, handle: Option<String>) -> bool {
        succeeded(
            "updateDisplay",
            self.manager.update_display(&id(session_id), name, handle),
        )
    }

    pub fn merge_calls(&self, first: &str, second: &str) -> Option<String> {
        settle(
            "mergeCalls",
            self.manager.merge_conference(&id(first), &id(second)),
        )
        .map(|conference| conference.to_string())
    }

    pub fn set_available(&self, available: bool) {
        self.manager.set_available(available);
    }

    pub fn is_call_active(&self, session_id: &str) -> bool {
        self.manager.get(&id(session_id)).is_some()
    }

    pub fn get_active_sessions(&self) -> Vec<SessionView> {
        self.manager
            .active_sessions()
            .into_iter()
            .map(SessionView::from)
            .collect()
    }

    pub fn force_end_active_call(&self) -> bool {
        match self.manager.force_end_active_call() {
            Ok(ended) => ended,
            Err(e) => {
                error!("forceEndActiveCall failed: {}", e);
                false
            }
        }
    }

    pub fn manager(&self) -> &Arc<CallSessionManager> {
        &self.manager
    }
}

fn id(raw: &str) -> SessionId {
    SessionId::new(raw)
}

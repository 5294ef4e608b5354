//! Platform call registry adapter
//!
//! The registry creates connections and then calls back into each one.
//! Every connection is a [`PlatformSession`] implementing the single
//! [`SessionCallbacks`] capability set; callbacks answer with a boolean so a
//! late or duplicate callback never takes the host down.

use crate::application::{CallSessionManager, NewSession};
use crate::domain::session::record::SessionRecord;
use crate::domain::session::value_object::{
    Attributes, AudioRoute, AudioState, DisconnectCause, DisconnectReason,
};
use crate::domain::shared::value_objects::SessionId;
use crate::interface::{settle, succeeded};
use std::sync::Arc;
use tracing::debug;

/// Registry route bit flags
pub mod route {
    pub const EARPIECE: i32 = 0x01;
    pub const BLUETOOTH: i32 = 0x02;
    pub const WIRED_HEADSET: i32 = 0x04;
    pub const SPEAKER: i32 = 0x08;
}

/// Map a registry route flag onto an [`AudioRoute`]
pub fn audio_route_from_flag(flag: i32) -> AudioRoute {
    match flag {
        route::EARPIECE => AudioRoute::Earpiece,
        route::BLUETOOTH => AudioRoute::Bluetooth,
        route::WIRED_HEADSET => AudioRoute::WiredHeadset,
        route::SPEAKER => AudioRoute::Speaker,
        other => AudioRoute::Other(format!("route_{}", other)),
    }
}

/// Callbacks the platform registry delivers to one connection
pub trait SessionCallbacks: Send + Sync {
    fn session_id(&self) -> &SessionId;

    fn on_answer(&self) -> bool;

    fn on_reject(&self) -> bool;

    fn on_hold(&self) -> bool;

    fn on_unhold(&self) -> bool;

    /// Hang-up from the system UI
    fn on_disconnect(&self) -> bool;

    /// Hang-up carrying a raw reason code
    fn on_disconnect_with_reason(&self, code: i32) -> bool;

    fn on_abort(&self) -> bool;

    fn on_play_dtmf_tone(&self, digit: char) -> bool;

    fn on_call_audio_state_changed(&self, muted: bool, route: i32) -> bool;

    fn on_silence(&self) -> bool;

    /// Cause to set on the connection once the session has ended
    fn disconnect_cause(&self) -> Option<DisconnectCause>;
}

/// One platform connection bound to a managed session
#[derive(Clone)]
pub struct PlatformSession {
    id: SessionId,
    manager: Arc<CallSessionManager>,
}

impl PlatformSession {
    pub fn new(id: SessionId, manager: Arc<CallSessionManager>) -> Self {
        Self { id, manager }
    }

    pub fn record(&self) -> Option<SessionRecord> {
        self.manager.get(&self.id)
    }
}

impl SessionCallbacks for PlatformSession {
    fn session_id(&self) -> &SessionId {
        &self.id
    }

    fn on_answer(&self) -> bool {
        debug!("Platform answer for {}", self.id);
        succeeded("onAnswer", self.manager.answer(&self.id))
    }

    fn on_reject(&self) -> bool {
        succeeded("onReject", self.manager.reject(&self.id, None))
    }

    fn on_hold(&self) -> bool {
        succeeded("onHold", self.manager.hold(&self.id))
    }

    fn on_unhold(&self) -> bool {
        succeeded("onUnhold", self.manager.unhold(&self.id))
    }

    fn on_disconnect(&self) -> bool {
        succeeded(
            "onDisconnect",
            self.manager.disconnect(&self.id, DisconnectReason::Local),
        )
    }

    fn on_disconnect_with_reason(&self, code: i32) -> bool {
        succeeded(
            "onDisconnect",
            self.manager
                .disconnect(&self.id, DisconnectReason::from_code(code)),
        )
    }

    fn on_abort(&self) -> bool {
        succeeded(
            "onAbort",
            self.manager.disconnect(&self.id, DisconnectReason::Rejected),
        )
    }

    fn on_play_dtmf_tone(&self, digit: char) -> bool {
        succeeded("onPlayDtmfTone", self.manager.send_digit(&self.id, digit))
    }

    fn on_call_audio_state_changed(&self, muted: bool, route: i32) -> bool {
        let state = AudioState {
            muted,
            route: audio_route_from_flag(route),
        };
        succeeded(
            "onCallAudioStateChanged",
            self.manager.audio_state_changed(&self.id, state),
        )
    }

    fn on_silence(&self) -> bool {
        succeeded("onSilence", self.manager.silence_incoming(&self.id))
    }

    fn disconnect_cause(&self) -> Option<DisconnectCause> {
        self.manager.disconnect_cause(&self.id)
    }
}

/// Entry point for the platform call registry
#[derive(Clone)]
pub struct PlatformAdapter {
    manager: Arc<CallSessionManager>,
}

impl PlatformAdapter {
    pub fn new(manager: Arc<CallSessionManager>) -> Self {
        Self { manager }
    }

    /// Incoming call reported by the registry. `None` means the connection
    /// must be reported as failed.
    pub fn notify_incoming(
        &self,
        id: Option<SessionId>,
        attributes: Attributes,
    ) -> Option<PlatformSession> {
        let request = NewSession { id, attributes };
        settle("notifyIncoming", self.manager.create_incoming(request))
            .map(|id| PlatformSession::new(id, self.manager.clone()))
    }

    /// Outgoing call placed through the registry
    pub fn notify_outgoing_requested(
        &self,
        id: Option<SessionId>,
        attributes: Attributes,
    ) -> Option<PlatformSession> {
        let request = NewSession { id, attributes };
        settle(
            "notifyOutgoingRequested",
            self.manager.create_outgoing(request),
        )
        .map(|id| PlatformSession::new(id, self.manager.clone()))
    }

    /// Rebind to a connection the registry already knows
    pub fn session(&self, id: &SessionId) -> Option<PlatformSession> {
        self.manager
            .get(id)
            .map(|record| PlatformSession::new(record.id, self.manager.clone()))
    }

    pub fn manager(&self) -> &Arc<CallSessionManager> {
        &self.manager
    }
}

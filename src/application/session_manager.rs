//! Call session manager
//!
//! Public entry point for the platform call registry and the consuming
//! application. Every operation mutates the store under its lock, then,
//! with the lock released, publishes the produced events, updates the
//! presence indicator and the watchdog.

use crate::application::context::SessionContext;
use crate::domain::ports::{IncomingCallDisplay, IncomingCallUi, TelephonyControl, TelephonyError};
use crate::domain::session::aggregate::CallSession;
use crate::domain::session::event::CallEvent;
use crate::domain::session::record::SessionRecord;
use crate::domain::session::store::{Applied, SessionStore};
use crate::domain::session::value_object::{
    attr, Attributes, AudioState, Direction, DisconnectCause, DisconnectReason, SessionState,
};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use crate::infrastructure::metrics;
use crate::infrastructure::presence::PresenceCoordinator;
use crate::infrastructure::relay::EventRelay;
use crate::infrastructure::watchdog::ReachabilityWatchdog;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Request to create a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSession {
    /// Caller-supplied id; generated when absent
    pub id: Option<SessionId>,
    pub attributes: Attributes,
}

impl NewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<SessionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_number(self, number: impl Into<String>) -> Self {
        self.with_attribute(attr::NUMBER, number)
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_attribute(attr::NAME, name)
    }

    pub fn with_video(self, has_video: bool) -> Self {
        self.with_attribute(attr::HAS_VIDEO, has_video.to_string())
    }
}

pub struct CallSessionManager {
    context: SessionContext,
    store: Arc<SessionStore>,
    relay: EventRelay,
    watchdog: ReachabilityWatchdog,
    presence: PresenceCoordinator,
    incoming_ui: Arc<dyn IncomingCallUi>,
    telephony: Arc<dyn TelephonyControl>,
    available: AtomicBool,
}

impl CallSessionManager {
    /// Build the manager on the current tokio runtime
    pub fn new(context: SessionContext) -> Self {
        Self::with_runtime(context, Handle::current())
    }

    /// Build the manager with an explicit runtime handle, so platform
    /// callbacks may arrive on threads outside the runtime
    pub fn with_runtime(context: SessionContext, runtime: Handle) -> Self {
        let store = Arc::new(SessionStore::new());

        let relay = {
            let _guard = runtime.enter();
            EventRelay::spawn(context.config.relay.buffer_capacity)
        };

        let watchdog = ReachabilityWatchdog::new(
            context.config.reachability.enabled,
            context.config.reachability.timeout(),
            store.clone(),
            relay.clone(),
            context.collaborators.launcher.clone(),
            runtime,
        );

        let presence = PresenceCoordinator::new(
            context.collaborators.indicator.clone(),
            context.indicator_notice(),
            store.clone(),
        );

        info!(
            "Call session manager ready (reachability timeout {:?})",
            context.config.reachability.timeout()
        );

        Self {
            incoming_ui: context.collaborators.incoming_ui.clone(),
            telephony: context.collaborators.telephony.clone(),
            available: AtomicBool::new(context.config.calls.available),
            context,
            store,
            relay,
            watchdog,
            presence,
        }
    }

    /// Create an incoming session in `Ringing` and put up the incoming-call UI
    pub fn create_incoming(&self, request: NewSession) -> Result<SessionId> {
        let id = request.id.unwrap_or_else(SessionId::generate);

        if let Err(e) = self
            .store
            .create(id.clone(), Direction::Incoming, request.attributes.clone())
        {
            if matches!(e, DomainError::DuplicateSession(_)) {
                self.relay.emit(CallEvent::IncomingConnectionFailed {
                    session_id: id,
                    handle: request.attributes.get(attr::NUMBER).cloned(),
                    name: request.attributes.get(attr::NAME).cloned(),
                });
            }
            return Err(e);
        }
        metrics::record_session_created("incoming");

        let applied = self.apply(&id, |session| session.ring())?;
        let record = applied.record;

        self.incoming_ui.show_incoming_call(&IncomingCallDisplay {
            session_id: id.clone(),
            caller_number: record.caller_number().cloned(),
            caller_name: record.caller_name().cloned(),
            has_video: record.has_video(),
        });

        Ok(id)
    }

    /// Create an outgoing session in `Dialing`, arming the reachability
    /// watchdog when the application's liveness is unknown
    pub fn create_outgoing(&self, request: NewSession) -> Result<SessionId> {
        if !self.is_available() {
            return Err(DomainError::Unavailable);
        }

        let id = request.id.unwrap_or_else(SessionId::generate);
        self.store
            .create(id.clone(), Direction::Outgoing, request.attributes)?;
        metrics::record_session_created("outgoing");

        self.apply(&id, |session| session.dial())?;
        self.watchdog.arm(&id);

        Ok(id)
    }

    pub fn answer(&self, id: &SessionId) -> Result<()> {
        self.apply(id, |session| session.answer()).map(drop)
    }

    /// Application confirmed that an outgoing call connected
    pub fn set_current_call_active(&self, id: &SessionId) -> Result<()> {
        self.apply(id, |session| match session.state() {
            SessionState::Dialing | SessionState::Active => session.answer(),
            state => Err(DomainError::InvalidStateTransition(format!(
                "Session {} is {}, not dialing",
                session.id(),
                state
            ))),
        })
        .map(drop)
    }

    pub fn reject(&self, id: &SessionId, reason: Option<DisconnectReason>) -> Result<()> {
        self.apply(id, |session| session.reject(reason)).map(drop)
    }

    pub fn hold(&self, id: &SessionId) -> Result<()> {
        self.apply(id, |session| session.hold()).map(drop)
    }

    pub fn unhold(&self, id: &SessionId) -> Result<()> {
        self.apply(id, |session| session.unhold()).map(drop)
    }

    pub fn set_on_hold(&self, id: &SessionId, hold: bool) -> Result<()> {
        if hold {
            self.hold(id)
        } else {
            self.unhold(id)
        }
    }

    pub fn mute(&self, id: &SessionId, muted: bool) -> Result<()> {
        self.apply(id, |session| session.set_muted(muted)).map(drop)
    }

    pub fn send_digit(&self, id: &SessionId, digit: char) -> Result<()> {
        self.apply(id, |session| session.send_digit(digit)).map(drop)
    }

    pub fn audio_state_changed(&self, id: &SessionId, state: AudioState) -> Result<()> {
        self.apply(id, |session| session.audio_state_changed(state))
            .map(drop)
    }

    pub fn update_display(
        &self,
        id: &SessionId,
        name: Option<String>,
        address: Option<String>,
    ) -> Result<()> {
        self.apply(id, |session| session.update_display(name, address))
            .map(drop)
    }

    pub fn update_attributes(&self, id: &SessionId, attributes: Attributes) -> Result<()> {
        self.apply(id, |session| session.merge_attributes(attributes))
            .map(drop)
    }

    /// Stop the ringer of an alerting call; the call keeps ringing silently
    pub fn silence_incoming(&self, id: &SessionId) -> Result<()> {
        self.apply(id, |session| session.silence())?;
        self.incoming_ui.dismiss(id);
        Ok(())
    }

    pub fn disconnect(&self, id: &SessionId, reason: DisconnectReason) -> Result<()> {
        self.apply(id, |session| session.disconnect(reason)).map(drop)
    }

    /// State change requested by the application
    pub fn set_session_state(&self, id: &SessionId, target: SessionState) -> Result<()> {
        self.apply(id, |session| match (session.state(), target) {
            (current, target) if current == target => Ok(()),
            (SessionState::Ringing | SessionState::Dialing, SessionState::Active) => {
                session.answer()
            }
            (SessionState::Held, SessionState::Active) => session.unhold(),
            (_, SessionState::Held) => session.hold(),
            (_, SessionState::Disconnecting) => session.begin_disconnect(),
            (_, SessionState::Disconnected) => session.disconnect(DisconnectReason::Local),
            (current, target) => Err(DomainError::InvalidStateTransition(format!(
                "Session {} cannot be moved from {} to {}",
                session.id(),
                current,
                target
            ))),
        })
        .map(drop)
    }

    /// Group two connected sessions and unhold both
    pub fn merge_conference(&self, a: &SessionId, b: &SessionId) -> Result<ConferenceId> {
        let merged = self.store.merge(a, b)?;
        self.relay.emit_all(merged.events);
        Ok(merged.conference)
    }

    pub fn conference_members(&self, conference: &ConferenceId) -> Vec<SessionId> {
        self.store.conference_members(conference)
    }

    /// Hang up every live session. Returns how many were ended.
    pub fn end_all_calls(&self) -> usize {
        let ended = self
            .store
            .ids()
            .iter()
            .filter(|id| self.disconnect(id, DisconnectReason::Local).is_ok())
            .count();
        info!("Ended {} sessions", ended);
        ended
    }

    pub fn force_end_active_call(&self) -> std::result::Result<bool, TelephonyError> {
        self.telephony.force_end_active_call()
    }

    pub fn confirm_reachable(&self) -> usize {
        self.watchdog.confirm_reachable()
    }

    pub fn mark_unreachable(&self) {
        self.watchdog.mark_unreachable();
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
        info!("Outgoing calls {}", if available { "available" } else { "unavailable" });
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Cause to report to the registry once a session has ended
    pub fn disconnect_cause(&self, id: &SessionId) -> Option<DisconnectCause> {
        self.store.disconnect_cause(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.store.get(id)
    }

    pub fn active_sessions(&self) -> Vec<SessionRecord> {
        self.store.list_active()
    }

    pub fn relay(&self) -> &EventRelay {
        &self.relay
    }

    pub fn watchdog(&self) -> &ReachabilityWatchdog {
        &self.watchdog
    }

    pub fn presence(&self) -> &PresenceCoordinator {
        &self.presence
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Run one mutation and do the follow-up work outside the store lock
    fn apply<T, F>(&self, id: &SessionId, f: F) -> Result<Applied<T>>
    where
        F: FnOnce(&mut CallSession) -> Result<T>,
    {
        let applied = self.store.update(id, f)?;

        if applied.previous == SessionState::Ringing && applied.record.state != SessionState::Ringing
        {
            self.incoming_ui.dismiss(id);
        }

        for event in &applied.events {
            debug!("Session {} emitted {}", id, event.name());
        }
        self.relay.emit_all(applied.events.iter().cloned());

        if applied.removed {
            self.watchdog.cancel(id);
            info!(
                "Session {} ended from {} ({:?})",
                id, applied.previous, applied.record.disconnect_cause
            );
        }

        // Creation and teardown are the only count changes
        if applied.removed || applied.previous == SessionState::Initializing {
            self.presence.evaluate();
        }

        Ok(applied)
    }
}

impl Drop for CallSessionManager {
    fn drop(&mut self) {
        let remaining = self.store.active_count();
        if remaining > 0 {
            warn!("Call session manager dropped with {} live sessions", remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::Collaborators;
    use crate::config::Config;
    use crate::domain::ports::{
        MockApplicationLauncher, MockIncomingCallUi, MockPresenceIndicator, MockTelephonyControl,
    };

    fn manager_with(ui: MockIncomingCallUi, indicator: MockPresenceIndicator) -> CallSessionManager {
        let mut telephony = MockTelephonyControl::new();
        telephony.expect_force_end_active_call().returning(|| Ok(true));

        let collaborators = Collaborators {
            incoming_ui: Arc::new(ui),
            indicator: Arc::new(indicator),
            launcher: Arc::new(MockApplicationLauncher::new()),
            telephony: Arc::new(telephony),
        };
        CallSessionManager::new(SessionContext::new(Config::default(), collaborators))
    }

    fn relaxed_ui() -> MockIncomingCallUi {
        let mut ui = MockIncomingCallUi::new();
        ui.expect_show_incoming_call().return_const(());
        ui.expect_dismiss().return_const(());
        ui
    }

    fn relaxed_indicator() -> MockPresenceIndicator {
        let mut indicator = MockPresenceIndicator::new();
        indicator.expect_start().return_const(());
        indicator.expect_stop().return_const(());
        indicator
    }

    #[tokio::test]
    async fn test_incoming_shows_ui_with_caller_fields() {
        let mut ui = MockIncomingCallUi::new();
        ui.expect_show_incoming_call()
            .withf(|display| {
                display.session_id.as_str() == "A"
                    && display.caller_number.as_deref() == Some("+15551234")
                    && display.caller_name.as_deref() == Some("Bob")
                    && !display.has_video
            })
            .times(1)
            .return_const(());
        ui.expect_dismiss().times(1).return_const(());

        let manager = manager_with(ui, relaxed_indicator());
        let id = manager
            .create_incoming(NewSession::new().with_id("A").with_number("+15551234").with_name("Bob"))
            .unwrap();

        assert_eq!(manager.get(&id).unwrap().state, SessionState::Ringing);
        manager.answer(&id).unwrap();
        manager.answer(&id).unwrap();
    }

    #[tokio::test]
    async fn test_generated_ids_for_anonymous_requests() {
        let manager = manager_with(relaxed_ui(), relaxed_indicator());
        let a = manager.create_incoming(NewSession::new()).unwrap();
        let b = manager.create_incoming(NewSession::new()).unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.active_sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_blocks_outgoing() {
        let manager = manager_with(relaxed_ui(), relaxed_indicator());
        manager.set_available(false);

        let result = manager.create_outgoing(NewSession::new().with_id("B"));
        assert_eq!(result, Err(DomainError::Unavailable));
        assert!(manager.get(&SessionId::new("B")).is_none());
    }

    #[tokio::test]
    async fn test_set_session_state_drives_transitions() {
        let manager = manager_with(relaxed_ui(), relaxed_indicator());
        let id = manager.create_incoming(NewSession::new().with_id("A")).unwrap();

        manager.set_session_state(&id, SessionState::Active).unwrap();
        manager.set_session_state(&id, SessionState::Held).unwrap();
        assert_eq!(manager.get(&id).unwrap().state, SessionState::Held);

        manager.set_session_state(&id, SessionState::Active).unwrap();
        manager.set_session_state(&id, SessionState::Disconnecting).unwrap();
        assert_eq!(manager.get(&id).unwrap().state, SessionState::Disconnecting);

        assert!(manager.set_session_state(&id, SessionState::Ringing).is_err());

        manager.set_session_state(&id, SessionState::Disconnected).unwrap();
        assert!(manager.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_set_current_call_active_only_for_dialing() {
        let manager = manager_with(relaxed_ui(), relaxed_indicator());
        manager.confirm_reachable();

        let outgoing = manager.create_outgoing(NewSession::new().with_id("B")).unwrap();
        let incoming = manager.create_incoming(NewSession::new().with_id("A")).unwrap();

        manager.set_current_call_active(&outgoing).unwrap();
        assert_eq!(manager.get(&outgoing).unwrap().state, SessionState::Active);
        assert!(manager.set_current_call_active(&incoming).is_err());
    }

    #[tokio::test]
    async fn test_force_end_delegates_to_telephony() {
        let manager = manager_with(relaxed_ui(), relaxed_indicator());
        assert_eq!(manager.force_end_active_call(), Ok(true));
    }
}

//! Call session aggregate root
//!
//! Owns one session's record and enforces its state machine. Every accepted
//! transition records exactly one application event; callers drain them with
//! [`CallSession::take_events`] and publish them once the store lock is gone.

use crate::domain::session::event::CallEvent;
use crate::domain::session::record::SessionRecord;
use crate::domain::session::value_object::{
    attr, Attributes, AudioState, Direction, DisconnectReason, SessionState,
};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use tracing::debug;

const DTMF_DIGITS: &str = "0123456789*#ABCDabcd";

#[derive(Debug, Clone)]
pub struct CallSession {
    record: SessionRecord,
    /// Pending application events
    events: Vec<CallEvent>,
}

impl CallSession {
    pub fn new(id: SessionId, direction: Direction, attributes: Attributes) -> Self {
        Self {
            record: SessionRecord::new(id, direction, attributes),
            events: Vec::new(),
        }
    }

    /// Incoming path: start alerting
    pub fn ring(&mut self) -> Result<()> {
        self.transition_to(SessionState::Ringing)?;

        self.record_event(CallEvent::ShowIncomingCallUi {
            session_id: self.record.id.clone(),
            handle: self.record.caller_number().cloned(),
            name: self.record.caller_name().cloned(),
            has_video: self.record.has_video(),
        });

        Ok(())
    }

    /// Outgoing path: start placing the call
    pub fn dial(&mut self) -> Result<()> {
        self.transition_to(SessionState::Dialing)?;

        self.record_event(CallEvent::StartCall {
            session_id: self.record.id.clone(),
            handle: self.record.caller_number().cloned(),
            name: self.record.caller_name().cloned(),
        });

        Ok(())
    }

    /// Answer the call. Redundant answers are accepted silently: some
    /// platforms signal one user action more than once.
    pub fn answer(&mut self) -> Result<()> {
        let from = self.record.state;
        match from {
            SessionState::Ringing | SessionState::Dialing => {}
            SessionState::Active
            | SessionState::Held
            | SessionState::Disconnecting
            | SessionState::Disconnected => {
                debug!("Session {} already answered ({}), ignoring", self.record.id, from);
                return Ok(());
            }
            SessionState::Initializing => {
                return Err(self.invalid("answer"));
            }
        }

        self.transition_to(SessionState::Active)?;

        self.record_event(CallEvent::Answered {
            session_id: self.record.id.clone(),
            with_video: self.record.has_video(),
        });
        if from == SessionState::Ringing {
            self.record_event(CallEvent::AudioSessionActivated);
        }

        Ok(())
    }

    /// Reject an alerting call or cancel one being placed. Idempotent once
    /// the call is connected or gone.
    pub fn reject(&mut self, reason: Option<DisconnectReason>) -> Result<()> {
        match self.record.state {
            SessionState::Ringing | SessionState::Dialing | SessionState::Initializing => {
                self.disconnect(reason.unwrap_or(DisconnectReason::Rejected))
            }
            state => {
                debug!("Session {} not rejectable in {}, ignoring", self.record.id, state);
                Ok(())
            }
        }
    }

    pub fn hold(&mut self) -> Result<()> {
        match self.record.state {
            SessionState::Held => Ok(()),
            SessionState::Active => {
                self.transition_to(SessionState::Held)?;
                self.record_event(CallEvent::Held {
                    session_id: self.record.id.clone(),
                    hold: true,
                });
                Ok(())
            }
            _ => Err(self.invalid("hold")),
        }
    }

    pub fn unhold(&mut self) -> Result<()> {
        match self.record.state {
            SessionState::Active => Ok(()),
            SessionState::Held => {
                self.transition_to(SessionState::Active)?;
                self.record_event(CallEvent::Held {
                    session_id: self.record.id.clone(),
                    hold: false,
                });
                Ok(())
            }
            _ => Err(self.invalid("unhold")),
        }
    }

    /// Update the mute flag. An event is recorded only when the flag flips.
    pub fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.ensure_live("mute")?;

        if self.record.muted == muted {
            return Ok(());
        }

        self.record.muted = muted;
        self.record_event(CallEvent::Muted {
            session_id: self.record.id.clone(),
            muted,
        });

        Ok(())
    }

    pub fn send_digit(&mut self, digit: char) -> Result<()> {
        if matches!(
            self.record.state,
            SessionState::Initializing | SessionState::Disconnected
        ) {
            return Err(self.invalid("send digit"));
        }
        if !DTMF_DIGITS.contains(digit) {
            return Err(DomainError::InvalidOperation(format!(
                "'{}' is not a DTMF digit",
                digit
            )));
        }

        self.record_event(CallEvent::Dtmf {
            session_id: self.record.id.clone(),
            digit,
        });

        Ok(())
    }

    /// Apply a platform audio-state report. Mute and route are debounced
    /// independently.
    pub fn audio_state_changed(&mut self, state: AudioState) -> Result<()> {
        self.set_muted(state.muted)?;

        if self.record.audio_route.as_ref() != Some(&state.route) {
            self.record_event(CallEvent::AudioRouteChanged {
                session_id: self.record.id.clone(),
                route: state.route.to_string(),
            });
            self.record.audio_route = Some(state.route);
        }

        Ok(())
    }

    pub fn update_display(&mut self, name: Option<String>, address: Option<String>) -> Result<()> {
        self.ensure_live("update display")?;

        let mut update = Attributes::new();
        if let Some(name) = name {
            update.insert(attr::NAME.to_string(), name);
        }
        if let Some(address) = address {
            update.insert(attr::NUMBER.to_string(), address);
        }
        self.record.merge_attributes(update);

        Ok(())
    }

    pub fn merge_attributes(&mut self, attributes: Attributes) -> Result<()> {
        self.ensure_live("update attributes")?;
        self.record.merge_attributes(attributes);
        Ok(())
    }

    /// Silence the ringer of an alerting call without changing its state
    pub fn silence(&mut self) -> Result<()> {
        if self.record.state != SessionState::Ringing {
            return Err(self.invalid("silence"));
        }

        self.record_event(CallEvent::SilenceIncomingCall {
            session_id: self.record.id.clone(),
            handle: self.record.caller_number().cloned(),
            name: self.record.caller_name().cloned(),
        });

        Ok(())
    }

    /// Application asked to hang up; the platform confirms with `disconnect`
    pub fn begin_disconnect(&mut self) -> Result<()> {
        if self.record.state == SessionState::Disconnecting {
            return Ok(());
        }
        self.transition_to(SessionState::Disconnecting)
    }

    /// Terminal transition
    pub fn disconnect(&mut self, reason: DisconnectReason) -> Result<()> {
        self.transition_to(SessionState::Disconnected)?;
        self.record.awaiting_reachability = false;
        self.record.disconnect_cause = Some(reason.cause());

        self.record_event(CallEvent::Disconnected {
            session_id: self.record.id.clone(),
            reason,
        });

        Ok(())
    }

    pub fn set_awaiting_reachability(&mut self, awaiting: bool) {
        self.record.awaiting_reachability = awaiting;
    }

    pub(crate) fn set_conference(&mut self, conference: Option<ConferenceId>) {
        self.record.conference = conference;
    }

    fn ensure_live(&self, action: &str) -> Result<()> {
        if self.record.state.is_live() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &str) -> DomainError {
        DomainError::InvalidStateTransition(format!(
            "Cannot {} session {} in state {}",
            action, self.record.id, self.record.state
        ))
    }

    /// Transition to a new state
    fn transition_to(&mut self, new_state: SessionState) -> Result<()> {
        if !self.record.state.can_transition_to(new_state) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Session {}: cannot transition from {} to {}",
                self.record.id, self.record.state, new_state
            )));
        }

        debug!("Session {}: {} -> {}", self.record.id, self.record.state, new_state);
        self.record.state = new_state;
        Ok(())
    }

    fn record_event(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    // Getters
    pub fn id(&self) -> &SessionId {
        &self.record.id
    }

    pub fn state(&self) -> SessionState {
        self.record.state
    }

    pub fn direction(&self) -> Direction {
        self.record.direction
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn is_disconnected(&self) -> bool {
        self.record.state == SessionState::Disconnected
    }
}

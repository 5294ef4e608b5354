//! Collaborator ports
//!
//! Traits for the parts of the device this crate drives but does not own:
//! the incoming-call screen, the visible "call in progress" indicator, the
//! application launcher and the platform telephony service. Adapters live in
//! the infrastructure layer; tests substitute mocks.

use crate::domain::shared::value_objects::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// What the incoming-call screen needs to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallDisplay {
    pub session_id: SessionId,
    pub caller_number: Option<String>,
    pub caller_name: Option<String>,
    pub has_video: bool,
}

/// Data shown alongside the call-in-progress indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorNotice {
    pub channel_id: String,
    pub title: String,
}

/// Direct wake-up of the consuming application, bypassing the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeRequest {
    pub session_id: SessionId,
    pub caller_number: Option<String>,
    pub caller_name: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Application could not be started: {0}")]
    StartFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelephonyError {
    #[error("Telephony service unavailable: {0}")]
    Unavailable(String),

    #[error("Operation not permitted: {0}")]
    NotPermitted(String),
}

#[cfg_attr(test, automock)]
pub trait IncomingCallUi: Send + Sync {
    fn show_incoming_call(&self, display: &IncomingCallDisplay);

    /// The session stopped ringing (answered, rejected or gone)
    fn dismiss(&self, session_id: &SessionId);
}

/// Foreground / visible-call marker. Both calls must tolerate repetition.
#[cfg_attr(test, automock)]
pub trait PresenceIndicator: Send + Sync {
    fn start(&self, notice: &IndicatorNotice);

    fn stop(&self);
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApplicationLauncher: Send + Sync {
    async fn wake(&self, request: WakeRequest) -> Result<(), LaunchError>;
}

#[cfg_attr(test, automock)]
pub trait TelephonyControl: Send + Sync {
    /// End whatever cellular call currently holds the line. `Ok(false)` means
    /// there was nothing to end.
    fn force_end_active_call(&self) -> Result<bool, TelephonyError>;
}

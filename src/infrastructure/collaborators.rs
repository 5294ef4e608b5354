//! Tracing-backed collaborator adapters
//!
//! Stand-ins for the device services the core drives. They record what
//! would have happened through `tracing` and keep a count, which is enough
//! for the demo binary and for hosts without a real UI.

use crate::domain::ports::{
    ApplicationLauncher, IncomingCallDisplay, IncomingCallUi, IndicatorNotice, LaunchError,
    PresenceIndicator, TelephonyControl, TelephonyError, WakeRequest,
};
use crate::domain::shared::value_objects::SessionId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggingIncomingCallUi {
    shown: AtomicUsize,
}

impl LoggingIncomingCallUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::Relaxed)
    }
}

impl IncomingCallUi for LoggingIncomingCallUi {
    fn show_incoming_call(&self, call: &IncomingCallDisplay) {
        self.shown.fetch_add(1, Ordering::Relaxed);
        info!(
            "Incoming call UI: {} from {} ({}){}",
            call.session_id,
            call.caller_number.as_deref().unwrap_or("unknown"),
            call.caller_name.as_deref().unwrap_or("no name"),
            if call.has_video { " [video]" } else { "" }
        );
    }

    fn dismiss(&self, session_id: &SessionId) {
        info!("Incoming call UI dismissed for {}", session_id);
    }
}

#[derive(Debug, Default)]
pub struct LoggingPresenceIndicator {
    visible: AtomicBool,
}

impl LoggingPresenceIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }
}

impl PresenceIndicator for LoggingPresenceIndicator {
    fn start(&self, notice: &IndicatorNotice) {
        if !self.visible.swap(true, Ordering::AcqRel) {
            info!("Indicator shown on {}: {}", notice.channel_id, notice.title);
        }
    }

    fn stop(&self) {
        if self.visible.swap(false, Ordering::AcqRel) {
            info!("Indicator hidden");
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingApplicationLauncher {
    launches: AtomicUsize,
}

impl LoggingApplicationLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ApplicationLauncher for LoggingApplicationLauncher {
    async fn wake(&self, request: WakeRequest) -> Result<(), LaunchError> {
        self.launches.fetch_add(1, Ordering::Relaxed);
        info!(
            "Launching application for {} (caller {})",
            request.session_id,
            request.caller_number.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }
}

/// Telephony control for hosts without a cellular stack
#[derive(Debug, Default)]
pub struct NoTelephony;

impl TelephonyControl for NoTelephony {
    fn force_end_active_call(&self) -> Result<bool, TelephonyError> {
        Err(TelephonyError::Unavailable(
            "no telephony service on this host".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_tolerates_repetition() {
        let indicator = LoggingPresenceIndicator::new();
        let notice = IndicatorNotice {
            channel_id: "calls".to_string(),
            title: "Call in progress".to_string(),
        };

        indicator.start(&notice);
        indicator.start(&notice);
        assert!(indicator.is_visible());

        indicator.stop();
        indicator.stop();
        assert!(!indicator.is_visible());
    }

    #[test]
    fn test_incoming_ui_counts_shown_calls() {
        let ui = LoggingIncomingCallUi::new();
        ui.show_incoming_call(&IncomingCallDisplay {
            session_id: SessionId::new("A"),
            caller_number: Some("+15551234".to_string()),
            caller_name: None,
            has_video: true,
        });
        ui.dismiss(&SessionId::new("A"));

        assert_eq!(ui.shown(), 1);
    }

    #[tokio::test]
    async fn test_launcher_counts_wakeups() {
        let launcher = LoggingApplicationLauncher::new();
        let request = WakeRequest {
            session_id: SessionId::new("B"),
            caller_number: Some("100".to_string()),
            caller_name: None,
        };

        assert!(launcher.wake(request).await.is_ok());
        assert_eq!(launcher.launches(), 1);
    }

    #[test]
    fn test_no_telephony_reports_unavailable() {
        assert!(matches!(
            NoTelephony.force_end_active_call(),
            Err(TelephonyError::Unavailable(_))
        ));
    }
}

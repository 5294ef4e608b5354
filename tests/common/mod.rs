//! Shared test harness: recording collaborators around a real manager

#![allow(dead_code)]

use async_trait::async_trait;
use callkeep_core::application::context::{Collaborators, SessionContext};
use callkeep_core::config::Config;
use callkeep_core::domain::ports::{
    ApplicationLauncher, IncomingCallDisplay, IncomingCallUi, IndicatorNotice, LaunchError,
    PresenceIndicator, TelephonyControl, TelephonyError, WakeRequest,
};
use callkeep_core::domain::session::event::CallEvent;
use callkeep_core::domain::shared::value_objects::SessionId;
use callkeep_core::infrastructure::relay::EventStream;
use callkeep_core::interface::{ApplicationBridge, PlatformAdapter};
use callkeep_core::CallSessionManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct RecordingUi {
    pub shown: Mutex<Vec<IncomingCallDisplay>>,
    pub dismissed: Mutex<Vec<SessionId>>,
}

impl IncomingCallUi for RecordingUi {
    fn show_incoming_call(&self, display: &IncomingCallDisplay) {
        self.shown.lock().unwrap().push(display.clone());
    }

    fn dismiss(&self, session_id: &SessionId) {
        self.dismissed.lock().unwrap().push(session_id.clone());
    }
}

#[derive(Default)]
pub struct RecordingIndicator {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl RecordingIndicator {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl PresenceIndicator for RecordingIndicator {
    fn start(&self, _notice: &IndicatorNotice) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub requests: Mutex<Vec<WakeRequest>>,
}

impl RecordingLauncher {
    pub fn launches(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ApplicationLauncher for RecordingLauncher {
    async fn wake(&self, request: WakeRequest) -> Result<(), LaunchError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

pub struct FixedTelephony(pub Result<bool, TelephonyError>);

impl TelephonyControl for FixedTelephony {
    fn force_end_active_call(&self) -> Result<bool, TelephonyError> {
        self.0.clone()
    }
}

pub struct Harness {
    pub manager: Arc<CallSessionManager>,
    pub platform: PlatformAdapter,
    pub bridge: ApplicationBridge,
    pub ui: Arc<RecordingUi>,
    pub indicator: Arc<RecordingIndicator>,
    pub launcher: Arc<RecordingLauncher>,
}

/// Configuration with a 50 ms reachability timeout
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.reachability.timeout_ms = 50;
    config
}

pub fn harness() -> Harness {
    harness_with(fast_config(), Ok(true))
}

pub fn harness_with(config: Config, telephony: Result<bool, TelephonyError>) -> Harness {
    let ui = Arc::new(RecordingUi::default());
    let indicator = Arc::new(RecordingIndicator::default());
    let launcher = Arc::new(RecordingLauncher::default());

    let collaborators = Collaborators {
        incoming_ui: ui.clone(),
        indicator: indicator.clone(),
        launcher: launcher.clone(),
        telephony: Arc::new(FixedTelephony(telephony)),
    };
    let manager = Arc::new(CallSessionManager::new(SessionContext::new(
        config,
        collaborators,
    )));

    Harness {
        platform: PlatformAdapter::new(manager.clone()),
        bridge: ApplicationBridge::new(manager.clone()),
        manager,
        ui,
        indicator,
        launcher,
    }
}

/// Everything the listener has received so far
pub async fn received(harness: &Harness, stream: &mut EventStream) -> Vec<CallEvent> {
    // Round-trip through the delivery loop so earlier emits are processed
    harness.manager.relay().status().await;

    let mut events = Vec::new();
    while let Ok(envelope) = stream.try_recv() {
        events.push(envelope.event);
    }
    events
}

pub fn names(events: &[CallEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

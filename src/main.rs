use callkeep_core::application::context::{Collaborators, SessionContext};
use callkeep_core::config::Config;
use callkeep_core::domain::session::value_object::attr;
use callkeep_core::domain::session::Attributes;
use callkeep_core::infrastructure::collaborators::{
    LoggingApplicationLauncher, LoggingIncomingCallUi, LoggingPresenceIndicator, NoTelephony,
};
use callkeep_core::infrastructure::metrics::describe_metrics;
use callkeep_core::interface::platform::route;
use callkeep_core::interface::{ApplicationBridge, PlatformAdapter, SessionCallbacks};
use callkeep_core::CallSessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting callkeep demo");
    info!("Configuration loaded: {:?}", config);

    describe_metrics();

    let launcher = Arc::new(LoggingApplicationLauncher::new());
    let collaborators = Collaborators {
        incoming_ui: Arc::new(LoggingIncomingCallUi::new()),
        indicator: Arc::new(LoggingPresenceIndicator::new()),
        launcher: launcher.clone(),
        telephony: Arc::new(NoTelephony),
    };
    let manager = Arc::new(CallSessionManager::new(SessionContext::new(
        config.clone(),
        collaborators,
    )));

    let platform = PlatformAdapter::new(manager.clone());
    let bridge = ApplicationBridge::new(manager.clone());

    demo_incoming_call(&platform, &bridge).await?;
    demo_outgoing_wakeup(&platform, &bridge, config.reachability.timeout()).await?;

    info!(
        "Demo complete: {} live sessions, {} application launches",
        manager.active_sessions().len(),
        launcher.launches()
    );

    Ok(())
}

/// Incoming call received while the application is not listening yet
async fn demo_incoming_call(
    platform: &PlatformAdapter,
    bridge: &ApplicationBridge,
) -> anyhow::Result<()> {
    info!("=== Incoming Call Demo ===");

    let mut attributes = Attributes::new();
    attributes.insert(attr::NUMBER.to_string(), "+15551234".to_string());
    attributes.insert(attr::NAME.to_string(), "Bob".to_string());

    let session = platform
        .notify_incoming(Some("A".into()), attributes)
        .ok_or_else(|| anyhow::anyhow!("incoming call rejected"))?;
    info!("Session {} ringing", session.session_id());

    session.on_answer();
    session.on_call_audio_state_changed(false, route::SPEAKER);
    session.on_play_dtmf_tone('5');

    // Application comes up and pulls its backlog
    let mut events = bridge.subscribe().await;
    while let Ok(envelope) = events.try_recv() {
        info!(
            "Replayed {}: {}",
            envelope.event.name(),
            serde_json::to_string(&envelope.event)?
        );
    }

    session.on_hold();
    session.on_unhold();
    session.on_disconnect();
    session.on_disconnect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    while let Ok(envelope) = events.try_recv() {
        info!("Delivered {}", envelope.event.name());
    }

    info!("=== Incoming Call Demo Complete ===");
    Ok(())
}

/// Outgoing call while the application never confirms it is alive
async fn demo_outgoing_wakeup(
    platform: &PlatformAdapter,
    bridge: &ApplicationBridge,
    timeout: Duration,
) -> anyhow::Result<()> {
    info!("=== Outgoing Call Demo ===");

    bridge.detach_listener();

    let mut attributes = Attributes::new();
    attributes.insert(attr::NUMBER.to_string(), "100".to_string());

    let session = platform
        .notify_outgoing_requested(Some("B".into()), attributes)
        .ok_or_else(|| anyhow::anyhow!("outgoing call rejected"))?;

    tokio::time::sleep(timeout + Duration::from_millis(100)).await;

    // Too late: the watchdog already woke the application
    let cancelled = bridge.confirm_reachable();
    info!("Late confirmation cancelled {} timers", cancelled);

    for pending in bridge.get_initial_events().await {
        info!("Backlog {} {:?}", pending.name, pending.payload);
    }

    session.on_disconnect_with_reason(2);

    info!("=== Outgoing Call Demo Complete ===");
    Ok(())
}

//! Session context
//!
//! Everything the manager needs from the outside world, passed in explicitly
//! instead of living in process-wide statics.

use crate::config::Config;
use crate::domain::ports::{
    ApplicationLauncher, IncomingCallUi, IndicatorNotice, PresenceIndicator, TelephonyControl,
};
use std::sync::Arc;

/// Collaborator adapters supplied by the host
#[derive(Clone)]
pub struct Collaborators {
    pub incoming_ui: Arc<dyn IncomingCallUi>,
    pub indicator: Arc<dyn PresenceIndicator>,
    pub launcher: Arc<dyn ApplicationLauncher>,
    pub telephony: Arc<dyn TelephonyControl>,
}

#[derive(Clone)]
pub struct SessionContext {
    pub config: Config,
    pub collaborators: Collaborators,
}

impl SessionContext {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub fn indicator_notice(&self) -> IndicatorNotice {
        IndicatorNotice {
            channel_id: self.config.presence.channel_id.clone(),
            title: self.config.presence.notification_title.clone(),
        }
    }
}

//! Presence coordinator
//!
//! Keeps the external call-in-progress indicator in step with the number of
//! live sessions. The count is always read from the store rather than
//! tracked separately, and evaluations are serialized so two sessions ending
//! at once produce a single stop.

use crate::domain::ports::{IndicatorNotice, PresenceIndicator};
use crate::domain::session::store::SessionStore;
use crate::infrastructure::metrics;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Started,
    Stopped,
    Unchanged,
}

pub struct PresenceCoordinator {
    indicator: Arc<dyn PresenceIndicator>,
    notice: IndicatorNotice,
    store: Arc<SessionStore>,
    started: Mutex<bool>,
}

impl PresenceCoordinator {
    pub fn new(
        indicator: Arc<dyn PresenceIndicator>,
        notice: IndicatorNotice,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            indicator,
            notice,
            store,
            started: Mutex::new(false),
        }
    }

    /// Re-read the live count and start or stop the indicator on 0 <-> 1+
    /// edges. Call after every store mutation that can change the count.
    pub fn evaluate(&self) -> PresenceChange {
        let mut started = self
            .started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let active = self.store.active_count();
        metrics::update_active_sessions(active);

        match (active > 0, *started) {
            (true, false) => {
                info!("First live session, starting call indicator");
                self.indicator.start(&self.notice);
                *started = true;
                PresenceChange::Started
            }
            (false, true) => {
                info!("No live sessions left, stopping call indicator");
                self.indicator.stop();
                *started = false;
                PresenceChange::Stopped
            }
            _ => PresenceChange::Unchanged,
        }
    }

    pub fn is_started(&self) -> bool {
        *self
            .started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

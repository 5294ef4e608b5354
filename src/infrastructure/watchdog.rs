//! Reachability watchdog
//!
//! Armed for outgoing sessions while the application's liveness is unknown.
//! Each armed session gets one timer and one single-use `consumed` flag:
//! whichever of confirmation, cancellation or the timer swaps the flag first
//! decides the outcome, the others become no-ops. The timer task is never
//! aborted once it has claimed the flag.

use crate::domain::ports::{ApplicationLauncher, WakeRequest};
use crate::domain::session::event::CallEvent;
use crate::domain::session::store::SessionStore;
use crate::domain::shared::value_objects::SessionId;
use crate::infrastructure::metrics;
use crate::infrastructure::relay::EventRelay;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachabilityRequest {
    pub session_id: SessionId,
    pub submitted_at: DateTime<Utc>,
    pub timeout_ms: u64,
}

struct Armed {
    request: ReachabilityRequest,
    consumed: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

impl Armed {
    /// Claim the flag and stop the timer. False if the timer already won.
    fn disarm(self) -> bool {
        if claim(&self.consumed) {
            self.timer.abort();
            true
        } else {
            false
        }
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

struct Inner {
    enabled: bool,
    timeout: Duration,
    reachable: AtomicBool,
    pending: Mutex<HashMap<SessionId, Armed>>,
    store: Arc<SessionStore>,
    relay: EventRelay,
    launcher: Arc<dyn ApplicationLauncher>,
    runtime: Handle,
}

#[derive(Clone)]
pub struct ReachabilityWatchdog {
    inner: Arc<Inner>,
}

impl ReachabilityWatchdog {
    pub fn new(
        enabled: bool,
        timeout: Duration,
        store: Arc<SessionStore>,
        relay: EventRelay,
        launcher: Arc<dyn ApplicationLauncher>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled,
                timeout,
                reachable: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
                store,
                relay,
                launcher,
                runtime,
            }),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<SessionId, Armed>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Arm the watchdog for a freshly created outgoing session. Returns false
    /// when it is not needed (application confirmed, feature disabled) or a
    /// request for this session already exists.
    pub fn arm(&self, session_id: &SessionId) -> bool {
        if !self.inner.enabled || self.is_reachable() {
            return false;
        }

        let mut pending = self.pending();
        if pending.contains_key(session_id) {
            debug!("Reachability check already pending for {}", session_id);
            return false;
        }

        let marked = self.inner.store.update(session_id, |session| {
            session.set_awaiting_reachability(true);
            Ok(())
        });
        if let Err(e) = marked {
            debug!("Not arming watchdog for {}: {}", session_id, e);
            return false;
        }

        let consumed = Arc::new(AtomicBool::new(false));
        let timer = {
            let inner = self.inner.clone();
            let consumed = consumed.clone();
            let session_id = session_id.clone();
            self.inner.runtime.spawn(async move {
                tokio::time::sleep(inner.timeout).await;
                Inner::fire(inner, session_id, consumed).await;
            })
        };

        pending.insert(
            session_id.clone(),
            Armed {
                request: ReachabilityRequest {
                    session_id: session_id.clone(),
                    submitted_at: Utc::now(),
                    timeout_ms: self.inner.timeout.as_millis() as u64,
                },
                consumed,
                timer,
            },
        );
        drop(pending);

        info!(
            "Application liveness unknown, checking reachability for {} ({:?})",
            session_id, self.inner.timeout
        );
        self.inner.relay.emit(CallEvent::ReachabilityCheck);
        true
    }

    /// The application answered the reachability check. Cancels every
    /// outstanding timer and returns how many were cancelled.
    pub fn confirm_reachable(&self) -> usize {
        self.inner.reachable.store(true, Ordering::Release);

        let armed: Vec<Armed> = self.pending().drain().map(|(_, armed)| armed).collect();
        let mut cancelled = 0;
        for armed in armed {
            let session_id = armed.request.session_id.clone();
            if armed.disarm() {
                cancelled += 1;
                self.clear_awaiting(&session_id);
                debug!("Reachability confirmed for {}", session_id);
            }
        }

        if cancelled > 0 {
            info!("Application reachable, cancelled {} wake-up timers", cancelled);
        }
        cancelled
    }

    /// Session ended; drop its timer if it has not fired
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        let armed = self.pending().remove(session_id);
        match armed {
            Some(armed) => {
                let cancelled = armed.disarm();
                if cancelled {
                    debug!("Reachability check for {} cancelled", session_id);
                }
                cancelled
            }
            None => false,
        }
    }

    /// Application went away; later outgoing sessions are watched again
    pub fn mark_unreachable(&self) {
        self.inner.reachable.store(false, Ordering::Release);
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::Acquire)
    }

    pub fn pending_request(&self, session_id: &SessionId) -> Option<ReachabilityRequest> {
        self.pending().get(session_id).map(|armed| armed.request.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    fn clear_awaiting(&self, session_id: &SessionId) {
        let _ = self.inner.store.update(session_id, |session| {
            session.set_awaiting_reachability(false);
            Ok(())
        });
    }
}

impl Inner {
    async fn fire(inner: Arc<Inner>, session_id: SessionId, consumed: Arc<AtomicBool>) {
        if !claim(&consumed) {
            return;
        }

        inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&session_id);

        // The event goes out under the store lock, so it is queued ahead of
        // any `disconnected` a concurrent hang-up publishes afterwards.
        let relay = &inner.relay;
        let applied = inner.store.update(&session_id, |session| {
            session.set_awaiting_reachability(false);
            let record = session.record();
            let request = WakeRequest {
                session_id: record.id.clone(),
                caller_number: record.caller_number().cloned(),
                caller_name: record.caller_name().cloned(),
            };
            relay.emit(CallEvent::WakeApplication {
                session_id: request.session_id.clone(),
                caller_number: request.caller_number.clone(),
                caller_name: request.caller_name.clone(),
            });
            Ok(request)
        });
        let request = match applied {
            Ok(applied) => applied.value,
            Err(e) => {
                debug!("Reachability timeout for vanished session: {}", e);
                return;
            }
        };

        warn!(
            "Application did not confirm reachability within {:?}, waking it for {}",
            inner.timeout, session_id
        );
        metrics::record_application_wakeup();

        if !inner.store.contains(&session_id) {
            debug!("Session {} ended before the application was launched", session_id);
            return;
        }

        if let Err(e) = inner.launcher.wake(request).await {
            error!("Failed to wake application for {}: {}", session_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockApplicationLauncher;
    use crate::domain::session::value_object::{attr, Attributes, Direction, DisconnectReason};

    fn outgoing(store: &SessionStore, id: &str) -> SessionId {
        let id = SessionId::new(id);
        let mut attributes = Attributes::new();
        attributes.insert(attr::NUMBER.to_string(), "+15550000".to_string());
        store.create(id.clone(), Direction::Outgoing, attributes).unwrap();
        store.update(&id, |s| s.dial()).unwrap();
        id
    }

    fn watchdog(launcher: MockApplicationLauncher, store: Arc<SessionStore>) -> ReachabilityWatchdog {
        watchdog_on(launcher, store, EventRelay::spawn(16))
    }

    fn watchdog_on(
        launcher: MockApplicationLauncher,
        store: Arc<SessionStore>,
        relay: EventRelay,
    ) -> ReachabilityWatchdog {
        ReachabilityWatchdog::new(
            true,
            Duration::from_millis(50),
            store,
            relay,
            Arc::new(launcher),
            Handle::current(),
        )
    }

    fn pending_names(pending: &[crate::domain::session::event::PendingEvent]) -> Vec<&str> {
        pending.iter().map(|p| p.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_timeout_wakes_application_once() {
        let store = Arc::new(SessionStore::new());
        let id = outgoing(&store, "B");

        let mut launcher = MockApplicationLauncher::new();
        launcher
            .expect_wake()
            .withf(|request| {
                request.session_id.as_str() == "B"
                    && request.caller_number.as_deref() == Some("+15550000")
            })
            .times(1)
            .returning(|_| Ok(()));

        let watchdog = watchdog(launcher, store.clone());
        assert!(watchdog.arm(&id));
        assert!(!watchdog.arm(&id));
        assert!(store.get(&id).unwrap().awaiting_reachability);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(watchdog.pending_count(), 0);
        assert!(!store.get(&id).unwrap().awaiting_reachability);
        assert_eq!(watchdog.confirm_reachable(), 0);
    }

    #[tokio::test]
    async fn test_confirmation_cancels_timer() {
        let store = Arc::new(SessionStore::new());
        let id = outgoing(&store, "B");

        let mut launcher = MockApplicationLauncher::new();
        launcher.expect_wake().times(0);

        let watchdog = watchdog(launcher, store.clone());
        assert!(watchdog.arm(&id));
        assert_eq!(watchdog.confirm_reachable(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!store.get(&id).unwrap().awaiting_reachability);
        assert!(watchdog.is_reachable());
    }

    #[tokio::test]
    async fn test_reachable_application_skips_watchdog() {
        let store = Arc::new(SessionStore::new());
        let id = outgoing(&store, "B");

        let watchdog = watchdog(MockApplicationLauncher::new(), store);
        watchdog.confirm_reachable();

        assert!(!watchdog.arm(&id));
        assert!(watchdog.pending_request(&id).is_none());

        watchdog.mark_unreachable();
        assert!(watchdog.arm(&id));
        assert_eq!(watchdog.pending_request(&id).unwrap().timeout_ms, 50);
        watchdog.cancel(&id);
    }

    #[tokio::test]
    async fn test_cancel_before_timeout() {
        let store = Arc::new(SessionStore::new());
        let id = outgoing(&store, "B");

        let mut launcher = MockApplicationLauncher::new();
        launcher.expect_wake().times(0);

        let watchdog = watchdog(launcher, store);
        watchdog.arm(&id);
        assert!(watchdog.cancel(&id));
        assert!(!watchdog.cancel(&id));

        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    #[tokio::test]
    async fn test_launch_failure_is_logged_not_retried() {
        let store = Arc::new(SessionStore::new());
        let id = outgoing(&store, "B");

        let mut launcher = MockApplicationLauncher::new();
        launcher
            .expect_wake()
            .times(1)
            .returning(|_| Err(crate::domain::ports::LaunchError::StartFailed("denied".into())));

        let watchdog = watchdog(launcher, store);
        watchdog.arm(&id);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(watchdog.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_ended_session_is_not_woken() {
        let store = Arc::new(SessionStore::new());
        let id = outgoing(&store, "B");
        let relay = EventRelay::spawn(16);

        let mut launcher = MockApplicationLauncher::new();
        launcher.expect_wake().times(0);

        let watchdog = watchdog_on(launcher, store.clone(), relay.clone());
        watchdog.arm(&id);

        // Hang-up that never reaches `cancel`; the timer still fires
        let ended = store
            .update(&id, |s| s.disconnect(DisconnectReason::Remote))
            .unwrap();
        relay.emit_all(ended.events);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(watchdog.pending_count(), 0);
        assert_eq!(pending_names(&relay.drain().await), vec!["disconnected"]);
    }

    #[tokio::test]
    async fn test_wake_event_precedes_later_hangup() {
        let store = Arc::new(SessionStore::new());
        let id = outgoing(&store, "B");
        let relay = EventRelay::spawn(16);

        let mut launcher = MockApplicationLauncher::new();
        launcher.expect_wake().times(1).returning(|_| Ok(()));

        let watchdog = watchdog_on(launcher, store.clone(), relay.clone());
        watchdog.arm(&id);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let ended = store
            .update(&id, |s| s.disconnect(DisconnectReason::Local))
            .unwrap();
        relay.emit_all(ended.events);

        assert_eq!(
            pending_names(&relay.drain().await),
            vec!["wakeApplication", "disconnected"]
        );
    }
}

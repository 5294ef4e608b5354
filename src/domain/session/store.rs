//! Session store
//!
//! Concurrent map from session id to call session. A single mutex serializes
//! every mutation; callers get the events a mutation produced back and publish
//! them after the lock is released.

use crate::domain::session::aggregate::CallSession;
use crate::domain::session::conference::{ConferenceGroups, Departure};
use crate::domain::session::event::CallEvent;
use crate::domain::session::record::SessionRecord;
use crate::domain::session::value_object::{Attributes, Direction, DisconnectCause, SessionState};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Outcome of a mutation applied through [`SessionStore::update`]
#[derive(Debug)]
pub struct Applied<T> {
    pub value: T,
    /// State before the mutation
    pub previous: SessionState,
    pub events: Vec<CallEvent>,
    /// Snapshot after the mutation (taken before removal for terminal states)
    pub record: SessionRecord,
    /// The mutation ended the session and the store dropped it
    pub removed: bool,
}

/// Outcome of a conference merge
#[derive(Debug)]
pub struct Merged {
    pub conference: ConferenceId,
    pub members: Vec<SessionId>,
    pub events: Vec<CallEvent>,
}

#[derive(Default)]
struct Inner {
    live: HashMap<SessionId, CallSession>,
    /// Ids that were removed, with the cause they ended on; never handed
    /// out again
    retired: HashMap<SessionId, DisconnectCause>,
    conferences: ConferenceGroups,
}

pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a new session in `Initializing`
    pub fn create(
        &self,
        id: SessionId,
        direction: Direction,
        attributes: Attributes,
    ) -> Result<SessionRecord> {
        let mut inner = self.lock();

        if inner.live.contains_key(&id) || inner.retired.contains_key(&id) {
            return Err(DomainError::DuplicateSession(id));
        }

        let session = CallSession::new(id.clone(), direction, attributes);
        let record = session.record().clone();
        inner.live.insert(id.clone(), session);

        info!("Session {} created ({:?})", id, direction);
        Ok(record)
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.lock().live.get(id).map(|s| s.record().clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.lock().live.contains_key(id)
    }

    /// Run a mutation against one session. A mutation that drives the session
    /// to `Disconnected` removes it in the same critical section, so no other
    /// caller ever observes a terminal record.
    pub fn update<T, F>(&self, id: &SessionId, f: F) -> Result<Applied<T>>
    where
        F: FnOnce(&mut CallSession) -> Result<T>,
    {
        let mut inner = self.lock();

        let session = inner
            .live
            .get_mut(id)
            .ok_or_else(|| DomainError::SessionNotFound(id.clone()))?;

        let previous = session.state();
        let outcome = f(session);
        let events = session.take_events();
        let record = session.record().clone();
        let value = outcome?;

        let removed = record.state == SessionState::Disconnected;
        if removed {
            Self::remove_locked(&mut inner, id);
        }

        Ok(Applied {
            value,
            previous,
            events,
            record,
            removed,
        })
    }

    /// Drop a session. Removing an absent id is a no-op because teardown can
    /// race with platform hangups.
    pub fn remove(&self, id: &SessionId) -> Option<SessionRecord> {
        let mut inner = self.lock();
        Self::remove_locked(&mut inner, id)
    }

    fn remove_locked(inner: &mut Inner, id: &SessionId) -> Option<SessionRecord> {
        let session = inner.live.remove(id)?;
        let record = session.record().clone();
        inner.retired.insert(
            id.clone(),
            record.disconnect_cause.unwrap_or(DisconnectCause::Local),
        );

        match inner.conferences.leave(id, record.conference) {
            Departure::Dissolved {
                conference,
                remaining,
            } => {
                debug!("Conference {} dissolved", conference);
                for member in remaining {
                    if let Some(other) = inner.live.get_mut(&member) {
                        other.set_conference(None);
                    }
                }
            }
            Departure::Left(conference) => {
                debug!("Session {} left conference {}", id, conference);
            }
            Departure::NotGrouped => {}
        }

        info!("Session {} removed", id);
        Some(record)
    }

    /// Group two connected sessions and unhold both
    pub fn merge(&self, a: &SessionId, b: &SessionId) -> Result<Merged> {
        if a == b {
            return Err(DomainError::InvalidOperation(format!(
                "Cannot merge session {} with itself",
                a
            )));
        }

        let mut inner = self.lock();

        let mut current = Vec::with_capacity(2);
        for id in [a, b] {
            let session = inner
                .live
                .get(id)
                .ok_or_else(|| DomainError::SessionNotFound(id.clone()))?;
            if !session.state().is_connected() {
                return Err(DomainError::InvalidStateTransition(format!(
                    "Session {} cannot join a conference in state {}",
                    id,
                    session.state()
                )));
            }
            current.push(session.record().conference);
        }

        let (conference, members) = inner
            .conferences
            .merge((a, current[0]), (b, current[1]));

        let mut events = Vec::new();
        for id in &members {
            if let Some(session) = inner.live.get_mut(id) {
                session.set_conference(Some(conference));
                if [a, b].contains(&id) {
                    session.unhold()?;
                    events.extend(session.take_events());
                }
            }
        }

        info!("Sessions {} and {} merged into conference {}", a, b, conference);
        Ok(Merged {
            conference,
            members,
            events,
        })
    }

    /// Cause a removed session ended with. `None` while it is live or if the
    /// id was never known.
    pub fn disconnect_cause(&self, id: &SessionId) -> Option<DisconnectCause> {
        self.lock().retired.get(id).copied()
    }

    pub fn conference_members(&self, conference: &ConferenceId) -> Vec<SessionId> {
        self.lock().conferences.members(conference)
    }

    pub fn list_active(&self) -> Vec<SessionRecord> {
        let inner = self.lock();
        let mut records: Vec<_> = inner
            .live
            .values()
            .filter(|s| s.state().is_live())
            .map(|s| s.record().clone())
            .collect();
        records.sort_by(|x, y| x.created_at.cmp(&y.created_at).then_with(|| x.id.cmp(&y.id)));
        records
    }

    /// Authoritative live-session count
    pub fn active_count(&self) -> usize {
        self.lock()
            .live
            .values()
            .filter(|s| s.state().is_live())
            .count()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.lock().live.keys().cloned().collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::value_object::DisconnectReason;
    use std::sync::Arc;

    fn store_with_active(ids: &[&str]) -> SessionStore {
        let store = SessionStore::new();
        for id in ids {
            let id = SessionId::new(*id);
            store.create(id.clone(), Direction::Incoming, Attributes::new()).unwrap();
            store
                .update(&id, |s| {
                    s.ring()?;
                    s.answer()
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let store = SessionStore::new();
        let id = SessionId::new("A");

        store.create(id.clone(), Direction::Incoming, Attributes::new()).unwrap();
        let result = store.create(id.clone(), Direction::Outgoing, Attributes::new());
        assert_eq!(result.unwrap_err(), DomainError::DuplicateSession(id));
    }

    #[test]
    fn test_terminal_transition_records_cause() {
        let store = store_with_active(&["A", "B"]);
        let a = SessionId::new("A");

        let applied = store
            .update(&a, |s| s.disconnect(DisconnectReason::Busy))
            .unwrap();
        assert!(applied.removed);
        assert_eq!(applied.record.disconnect_cause, Some(DisconnectCause::Busy));
        assert_eq!(store.disconnect_cause(&a), Some(DisconnectCause::Busy));

        // Live sessions have no cause yet; plain removal counts as local
        let b = SessionId::new("B");
        assert_eq!(store.disconnect_cause(&b), None);
        store.remove(&b);
        assert_eq!(store.disconnect_cause(&b), Some(DisconnectCause::Local));
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let store = SessionStore::new();
        let id = SessionId::new("A");

        store.create(id.clone(), Direction::Incoming, Attributes::new()).unwrap();
        assert!(store.remove(&id).is_some());
        assert!(store.create(id, Direction::Incoming, Attributes::new()).is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        let id = SessionId::new("A");
        store.create(id.clone(), Direction::Incoming, Attributes::new()).unwrap();

        assert!(store.remove(&id).is_some());
        assert!(store.remove(&id).is_none());
        assert!(store.remove(&SessionId::new("never")).is_none());
    }

    #[test]
    fn test_update_unknown_session() {
        let store = SessionStore::new();
        let result = store.update(&SessionId::new("X"), |s| s.answer());
        assert!(matches!(result, Err(DomainError::SessionNotFound(_))));
    }

    #[test]
    fn test_terminal_update_removes_session() {
        let store = store_with_active(&["A"]);
        let id = SessionId::new("A");

        let applied = store
            .update(&id, |s| s.disconnect(DisconnectReason::Remote))
            .unwrap();

        assert!(applied.removed);
        assert_eq!(applied.record.state, SessionState::Disconnected);
        assert_eq!(applied.events.len(), 1);
        assert!(store.get(&id).is_none());
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_list_active_and_count() {
        let store = store_with_active(&["A", "B"]);
        assert_eq!(store.active_count(), 2);
        assert_eq!(store.list_active().len(), 2);
    }

    #[test]
    fn test_merge_unholds_both() {
        let store = store_with_active(&["A", "B"]);
        let (a, b) = (SessionId::new("A"), SessionId::new("B"));
        store.update(&a, |s| s.hold()).unwrap();

        let merged = store.merge(&a, &b).unwrap();

        assert_eq!(merged.members.len(), 2);
        assert_eq!(merged.events.len(), 1);
        assert_eq!(store.get(&a).unwrap().state, SessionState::Active);
        assert_eq!(store.get(&a).unwrap().conference, Some(merged.conference));
    }

    #[test]
    fn test_merge_requires_connected_sessions() {
        let store = store_with_active(&["A"]);
        let ringing = SessionId::new("R");
        store.create(ringing.clone(), Direction::Incoming, Attributes::new()).unwrap();
        store.update(&ringing, |s| s.ring()).unwrap();

        let result = store.merge(&SessionId::new("A"), &ringing);
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert!(store.get(&ringing).unwrap().conference.is_none());
    }

    #[test]
    fn test_disconnecting_member_leaves_conference() {
        let store = store_with_active(&["A", "B"]);
        let (a, b) = (SessionId::new("A"), SessionId::new("B"));
        let merged = store.merge(&a, &b).unwrap();

        store
            .update(&a, |s| s.disconnect(DisconnectReason::Local))
            .unwrap();

        let remaining = store.get(&b).unwrap();
        assert_eq!(remaining.state, SessionState::Active);
        assert!(remaining.conference.is_none());
        assert!(store.conference_members(&merged.conference).is_empty());
    }

    #[test]
    fn test_concurrent_creates_are_serialized() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .create(SessionId::new(format!("S{}", i % 8)), Direction::Incoming, Attributes::new())
                        .is_ok()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 8);
        assert_eq!(store.ids().len(), 8);
    }
}

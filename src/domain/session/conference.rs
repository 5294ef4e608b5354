//! Logical conference groups
//!
//! A group only ties sessions together for presentation. Each member keeps its
//! own disconnect path; leaving members shrink the group and a group with a
//! single member left is dissolved.

use crate::domain::shared::value_objects::{ConferenceId, SessionId};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct ConferenceGroups {
    groups: HashMap<ConferenceId, BTreeSet<SessionId>>,
}

/// Result of a member leaving its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// Session was not in a group
    NotGrouped,
    /// Group still has at least two members
    Left(ConferenceId),
    /// Group dissolved; the remaining member must be ungrouped as well
    Dissolved {
        conference: ConferenceId,
        remaining: Vec<SessionId>,
    },
}

impl ConferenceGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join two sessions. Reuses an existing group of either side; when both
    /// sides already have groups the second one is folded into the first.
    pub fn merge(
        &mut self,
        a: (&SessionId, Option<ConferenceId>),
        b: (&SessionId, Option<ConferenceId>),
    ) -> (ConferenceId, Vec<SessionId>) {
        let conference = match (a.1, b.1) {
            (Some(existing), Some(other)) if existing != other => {
                let folded = self.groups.remove(&other).unwrap_or_default();
                self.groups.entry(existing).or_default().extend(folded);
                existing
            }
            (Some(existing), _) | (_, Some(existing)) => existing,
            (None, None) => ConferenceId::new(),
        };

        let members = self.groups.entry(conference).or_default();
        members.insert(a.0.clone());
        members.insert(b.0.clone());

        (conference, members.iter().cloned().collect())
    }

    pub fn leave(&mut self, session: &SessionId, conference: Option<ConferenceId>) -> Departure {
        let Some(conference) = conference else {
            return Departure::NotGrouped;
        };
        let Some(members) = self.groups.get_mut(&conference) else {
            return Departure::NotGrouped;
        };

        members.remove(session);
        if members.len() >= 2 {
            return Departure::Left(conference);
        }

        let remaining = self
            .groups
            .remove(&conference)
            .map(|m| m.into_iter().collect())
            .unwrap_or_default();
        Departure::Dissolved {
            conference,
            remaining,
        }
    }

    pub fn members(&self, conference: &ConferenceId) -> Vec<SessionId> {
        self.groups
            .get(conference)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_creates_group() {
        let mut groups = ConferenceGroups::new();
        let a = SessionId::new("A");
        let b = SessionId::new("B");

        let (conference, members) = groups.merge((&a, None), (&b, None));
        assert_eq!(members, vec![a.clone(), b.clone()]);
        assert_eq!(groups.members(&conference).len(), 2);
    }

    #[test]
    fn test_third_member_joins_existing_group() {
        let mut groups = ConferenceGroups::new();
        let (a, b, c) = (SessionId::new("A"), SessionId::new("B"), SessionId::new("C"));

        let (conference, _) = groups.merge((&a, None), (&b, None));
        let (same, members) = groups.merge((&c, None), (&a, Some(conference)));

        assert_eq!(same, conference);
        assert_eq!(members.len(), 3);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_leaving_two_member_group_dissolves_it() {
        let mut groups = ConferenceGroups::new();
        let (a, b) = (SessionId::new("A"), SessionId::new("B"));
        let (conference, _) = groups.merge((&a, None), (&b, None));

        let departure = groups.leave(&a, Some(conference));
        assert_eq!(
            departure,
            Departure::Dissolved {
                conference,
                remaining: vec![b],
            }
        );
        assert!(groups.is_empty());
    }

    #[test]
    fn test_leave_without_group() {
        let mut groups = ConferenceGroups::new();
        assert_eq!(groups.leave(&SessionId::new("A"), None), Departure::NotGrouped);
    }
}

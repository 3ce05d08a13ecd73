use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use super::bus::PresenceEventBus;
use super::events::ServerEvent;
use super::registry::{ConnectionId, UserId};
use super::room::RoomId;

/// Whether redundant joins and leaves are announced to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Every join and leave call is announced, even when it changes nothing.
    #[default]
    AnnounceAlways,
    /// Only calls that change membership are announced.
    Deduplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipChange {
    /// Membership was modified by the call.
    pub changed: bool,
    /// Connections the announcement reached, `None` when nothing was announced.
    pub announced: Option<usize>,
}

/// The user ↔ group relation for group rooms.
///
/// Joining and leaving also move the member's connection in or out of the
/// group room on the bus, so logical membership and transport subscription
/// are only ever mutated together.
pub trait MembershipStore: Send {
    fn join(
        &mut self,
        bus: &mut PresenceEventBus,
        group: &RoomId,
        user: UserId,
        conn: ConnectionId,
        user_name: Option<String>,
    ) -> MembershipChange;

    /// `origin` is the connection that asked to leave; it never receives the
    /// departure notice.
    fn leave(
        &mut self,
        bus: &mut PresenceEventBus,
        group: &RoomId,
        user: &str,
        origin: ConnectionId,
    ) -> MembershipChange;

    fn members_of(&self, group: &RoomId) -> HashSet<UserId>;

    /// Every group the user currently belongs to.
    fn groups_of(&self, user: &str) -> Vec<RoomId>;

    /// Connection the user joined the group from.
    fn connection_of(&self, group: &RoomId, user: &str) -> Option<ConnectionId>;

    fn is_member(&self, group: &RoomId, user: &str) -> bool {
        self.connection_of(group, user).is_some()
    }

    /// Groups with at least one member.
    fn group_count(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct GroupMembershipTracker {
    policy: JoinPolicy,
    groups: HashMap<RoomId, HashMap<UserId, ConnectionId>>,
    by_user: HashMap<UserId, BTreeSet<RoomId>>,
}

impl GroupMembershipTracker {
    pub fn new(policy: JoinPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> JoinPolicy {
        self.policy
    }

    fn forget(&mut self, group: &RoomId, user: &str) -> Option<ConnectionId> {
        let members = self.groups.get_mut(group)?;
        let conn = members.remove(user)?;
        if members.is_empty() {
            self.groups.remove(group);
        }
        if let Some(groups) = self.by_user.get_mut(user) {
            groups.remove(group);
            if groups.is_empty() {
                self.by_user.remove(user);
            }
        }
        Some(conn)
    }
}

impl MembershipStore for GroupMembershipTracker {
    fn join(
        &mut self,
        bus: &mut PresenceEventBus,
        group: &RoomId,
        user: UserId,
        conn: ConnectionId,
        user_name: Option<String>,
    ) -> MembershipChange {
        let previous = self
            .groups
            .entry(group.clone())
            .or_default()
            .insert(user.clone(), conn);
        self.by_user
            .entry(user.clone())
            .or_default()
            .insert(group.clone());

        if let Some(old) = previous.filter(|old| *old != conn) {
            bus.unsubscribe(group, old);
        }
        bus.subscribe(group, conn);

        let changed = previous != Some(conn);
        if !changed {
            debug!("User {} is already a member of {}", user, group);
            if self.policy == JoinPolicy::Deduplicate {
                return MembershipChange {
                    changed,
                    announced: None,
                };
            }
        }

        info!("User {} joined group {}", user, group);
        let event = ServerEvent::UserJoinedGroup {
            user_id: user,
            user_name,
            timestamp: Utc::now(),
        };
        MembershipChange {
            changed,
            announced: Some(bus.broadcast(group, &event, Some(conn))),
        }
    }

    fn leave(
        &mut self,
        bus: &mut PresenceEventBus,
        group: &RoomId,
        user: &str,
        origin: ConnectionId,
    ) -> MembershipChange {
        let removed = self.forget(group, user);
        if let Some(conn) = removed {
            bus.unsubscribe(group, conn);
            info!("User {} left group {}", user, group);
        } else {
            debug!("User {} is not a member of {}", user, group);
            if self.policy == JoinPolicy::Deduplicate {
                return MembershipChange {
                    changed: false,
                    announced: None,
                };
            }
        }

        let event = ServerEvent::UserLeftGroup {
            user_id: user.to_string(),
            timestamp: Utc::now(),
        };
        MembershipChange {
            changed: removed.is_some(),
            announced: Some(bus.broadcast(group, &event, Some(origin))),
        }
    }

    fn members_of(&self, group: &RoomId) -> HashSet<UserId> {
        self.groups
            .get(group)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn groups_of(&self, user: &str) -> Vec<RoomId> {
        self.by_user
            .get(user)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn connection_of(&self, group: &RoomId, user: &str) -> Option<ConnectionId> {
        self.groups.get(group)?.get(user).copied()
    }

    fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::room::RoomResolver;
    use tokio::sync::mpsc;

    fn peer1() -> RoomId {
        RoomResolver::default().group_room_id("peer1")
    }

    fn attach(bus: &mut PresenceEventBus) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::new();
        bus.attach(conn, tx);
        (conn, rx)
    }

    #[test]
    fn test_join_then_leave() {
        let mut bus = PresenceEventBus::new();
        let mut tracker = GroupMembershipTracker::default();
        let (conn, _rx) = attach(&mut bus);
        let group = peer1();

        let change = tracker.join(&mut bus, &group, "u1".into(), conn, None);
        assert!(change.changed);
        assert!(tracker.members_of(&group).contains("u1"));
        assert!(bus.is_subscribed(&group, conn));
        assert_eq!(tracker.groups_of("u1"), vec![group.clone()]);
        assert_eq!(tracker.group_count(), 1);

        let change = tracker.leave(&mut bus, &group, "u1", conn);
        assert!(change.changed);
        assert!(!tracker.is_member(&group, "u1"));
        assert!(!bus.is_subscribed(&group, conn));
        assert!(tracker.groups_of("u1").is_empty());
        assert_eq!(tracker.group_count(), 0);
    }

    #[test]
    fn test_join_announces_to_others_only() {
        let mut bus = PresenceEventBus::new();
        let mut tracker = GroupMembershipTracker::default();
        let (c1, mut rx1) = attach(&mut bus);
        let (c2, mut rx2) = attach(&mut bus);
        let group = peer1();

        tracker.join(&mut bus, &group, "u1".into(), c1, Some("Ada".into()));
        let change = tracker.join(&mut bus, &group, "u2".into(), c2, Some("Bea".into()));
        assert_eq!(change.announced, Some(1));

        match rx1.try_recv().unwrap() {
            ServerEvent::UserJoinedGroup { user_id, user_name, .. } => {
                assert_eq!(user_id, "u2");
                assert_eq!(user_name.as_deref(), Some("Bea"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_redundant_join_is_announced_by_default() {
        let mut bus = PresenceEventBus::new();
        let mut tracker = GroupMembershipTracker::new(JoinPolicy::AnnounceAlways);
        let (c1, mut rx1) = attach(&mut bus);
        let (c2, _rx2) = attach(&mut bus);
        let group = peer1();

        tracker.join(&mut bus, &group, "u1".into(), c1, None);
        tracker.join(&mut bus, &group, "u2".into(), c2, None);
        let again = tracker.join(&mut bus, &group, "u2".into(), c2, None);

        assert!(!again.changed);
        assert_eq!(again.announced, Some(1));
        assert!(rx1.try_recv().is_ok());
        assert!(rx1.try_recv().is_ok());
    }

    #[test]
    fn test_deduplicate_policy_silences_redundant_calls() {
        let mut bus = PresenceEventBus::new();
        let mut tracker = GroupMembershipTracker::new(JoinPolicy::Deduplicate);
        let (c1, mut rx1) = attach(&mut bus);
        let (c2, _rx2) = attach(&mut bus);
        let group = peer1();

        tracker.join(&mut bus, &group, "u1".into(), c1, None);
        tracker.join(&mut bus, &group, "u2".into(), c2, None);
        assert!(rx1.try_recv().is_ok());

        let again = tracker.join(&mut bus, &group, "u2".into(), c2, None);
        assert_eq!(again.announced, None);
        let stray = tracker.leave(&mut bus, &group, "u3", c2);
        assert_eq!(stray.announced, None);
        assert!(rx1.try_recv().is_err());
        assert_eq!(tracker.policy(), JoinPolicy::Deduplicate);
    }

    #[test]
    fn test_rejoin_from_new_connection_moves_subscription() {
        let mut bus = PresenceEventBus::new();
        let mut tracker = GroupMembershipTracker::default();
        let (old, _rx_old) = attach(&mut bus);
        let (new, _rx_new) = attach(&mut bus);
        let group = peer1();

        tracker.join(&mut bus, &group, "u1".into(), old, None);
        let change = tracker.join(&mut bus, &group, "u1".into(), new, None);

        assert!(change.changed);
        assert_eq!(tracker.connection_of(&group, "u1"), Some(new));
        assert!(!bus.is_subscribed(&group, old));
        assert!(bus.is_subscribed(&group, new));
        assert_eq!(tracker.members_of(&group).len(), 1);
    }

    #[test]
    fn test_groups_of_tracks_every_group() {
        let mut bus = PresenceEventBus::new();
        let mut tracker = GroupMembershipTracker::default();
        let resolver = RoomResolver::default();
        let (conn, _rx) = attach(&mut bus);
        let g1 = resolver.group_room_id("g1");
        let g2 = resolver.group_room_id("g2");

        tracker.join(&mut bus, &g1, "u1".into(), conn, None);
        tracker.join(&mut bus, &g2, "u1".into(), conn, None);

        assert_eq!(tracker.groups_of("u1"), vec![g1, g2]);
        assert_eq!(tracker.group_count(), 2);
    }
}

use tracing::info;

use super::bus::PresenceEventBus;
use super::membership::MembershipStore;
use super::registry::{ConnectionId, SessionStore, UserId};
use super::room::RoomId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// User the connection was registered as, if any.
    pub user: Option<UserId>,
    /// Groups a departure was announced to.
    pub groups_left: Vec<RoomId>,
}

/// Unwinds every piece of relay state a closed connection held.
pub struct DisconnectReaper;

impl DisconnectReaper {
    pub fn reap(
        sessions: &mut dyn SessionStore,
        membership: &mut dyn MembershipStore,
        bus: &mut PresenceEventBus,
        conn: ConnectionId,
    ) -> ReapReport {
        let user = sessions.release(conn);

        let mut groups_left = Vec::new();
        if let Some(user) = &user {
            groups_left = Self::unwind(sessions, membership, bus, user, conn);
            info!("User {} disconnected, left {} group(s)", user, groups_left.len());
        }

        bus.detach(conn);
        ReapReport { user, groups_left }
    }

    /// Leaves the groups `user` joined from `conn`. Once the user has no
    /// live session it leaves every group, whichever connection joined it.
    pub fn unwind(
        sessions: &dyn SessionStore,
        membership: &mut dyn MembershipStore,
        bus: &mut PresenceEventBus,
        user: &str,
        conn: ConnectionId,
    ) -> Vec<RoomId> {
        let live = sessions.lookup(user).is_some();
        let mut groups_left = Vec::new();
        for group in membership.groups_of(user) {
            // A live session that rejoined from a newer connection keeps it.
            if live && membership.connection_of(&group, user) != Some(conn) {
                continue;
            }
            membership.leave(bus, &group, user, conn);
            groups_left.push(group);
        }
        groups_left
    }
}

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::bus::{EventSender, PresenceEventBus};
use super::events::{ClientEvent, ServerEvent};
use super::membership::{GroupMembershipTracker, MembershipChange, MembershipStore};
use super::reaper::{DisconnectReaper, ReapReport};
use super::registry::{ConnectionId, ConnectionRegistry, SessionStore};
use super::room::{RoomId, RoomResolver};
use crate::config::RelayConfig;
use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub users: usize,
    pub groups: usize,
}

/// What an accepted event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Registered { replaced: Option<ConnectionId> },
    JoinedRoom(RoomId),
    Membership(MembershipChange),
    Relayed { delivered: usize },
}

/// Owns all relay state for one process and applies client events to it.
pub struct RelayService {
    sessions: Box<dyn SessionStore>,
    membership: Box<dyn MembershipStore>,
    bus: PresenceEventBus,
    resolver: RoomResolver,
    config: RelayConfig,
}

impl RelayService {
    pub fn new(config: RelayConfig) -> Self {
        let membership = GroupMembershipTracker::new(config.join_policy);
        Self::with_stores(config, Box::new(ConnectionRegistry::new()), Box::new(membership))
    }

    pub fn with_stores(
        config: RelayConfig,
        sessions: Box<dyn SessionStore>,
        membership: Box<dyn MembershipStore>,
    ) -> Self {
        Self {
            sessions,
            membership,
            bus: PresenceEventBus::new(),
            resolver: RoomResolver::new(config.room_separator.clone()),
            config,
        }
    }

    pub fn connect(&mut self, conn: ConnectionId, sender: EventSender) {
        self.bus.attach(conn, sender);
    }

    pub fn disconnect(&mut self, conn: ConnectionId) -> ReapReport {
        DisconnectReaper::reap(
            self.sessions.as_mut(),
            self.membership.as_mut(),
            &mut self.bus,
            conn,
        )
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            users: self.sessions.len(),
            groups: self.membership.group_count(),
        }
    }

    pub fn resolver(&self) -> &RoomResolver {
        &self.resolver
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub fn membership(&self) -> &dyn MembershipStore {
        self.membership.as_ref()
    }

    pub fn handle(&mut self, conn: ConnectionId, event: ClientEvent) -> Result<Outcome, RelayError> {
        if !matches!(event, ClientEvent::RegisterUser(_)) {
            self.authorize(conn, &event)?;
        }

        match event {
            ClientEvent::RegisterUser(payload) => {
                let user = payload.into_user_id();
                info!("User {} registered on connection {}", user, conn);
                let previous = self.sessions.user_of(conn).filter(|prev| *prev != user);
                let replaced = self.sessions.register(user, conn);
                // The connection no longer speaks for its previous user.
                if let Some(previous) = previous {
                    let left = DisconnectReaper::unwind(
                        self.sessions.as_ref(),
                        self.membership.as_mut(),
                        &mut self.bus,
                        &previous,
                        conn,
                    );
                    info!("Connection {} dropped {}, who left {} group(s)", conn, previous, left.len());
                }
                Ok(Outcome::Registered { replaced })
            }
            ClientEvent::JoinChat { user_id, recipient_id } => {
                let room = self.resolver.direct_room_id(&user_id, &recipient_id);
                self.bus.subscribe(&room, conn);
                info!("{} joined chat with {} (room: {})", user_id, recipient_id, room);
                Ok(Outcome::JoinedRoom(room))
            }
            ClientEvent::JoinPeerGroup { group_id, user_id, user_name } => {
                if !self.config.accepts_group(&group_id) {
                    return Err(RelayError::UnknownGroup(group_id));
                }
                let room = self.resolver.group_room_id(&group_id);
                let change = self.membership.join(&mut self.bus, &room, user_id, conn, user_name);
                Ok(Outcome::Membership(change))
            }
            ClientEvent::LeavePeerGroup { group_id, user_id } => {
                let room = self.resolver.group_room_id(&group_id);
                let change = self.membership.leave(&mut self.bus, &room, &user_id, conn);
                Ok(Outcome::Membership(change))
            }
            ClientEvent::PrivateMessage { sender_id, recipient_id, text } => {
                let room = self.resolver.direct_room_id(&sender_id, &recipient_id);
                debug!("Private message from {} to {}", sender_id, recipient_id);
                let event = ServerEvent::ReceiveMessage {
                    text,
                    sender_id,
                    timestamp: Utc::now(),
                };
                Ok(self.relay(&room, &event, conn))
            }
            ClientEvent::Typing { sender_id, recipient_id, user_name } => {
                let room = self.resolver.direct_room_id(&sender_id, &recipient_id);
                Ok(self.relay(&room, &ServerEvent::Typing { sender_id, user_name }, conn))
            }
            ClientEvent::StopTyping { sender_id, recipient_id, user_name } => {
                let room = self.resolver.direct_room_id(&sender_id, &recipient_id);
                Ok(self.relay(&room, &ServerEvent::StopTyping { sender_id, user_name }, conn))
            }
            ClientEvent::GroupMessage { group_id, sender_id, text, sender_name } => {
                let room = self.member_room(&group_id, &sender_id, "group-message")?;
                debug!("Group message from {} in {}", sender_id, group_id);
                let event = ServerEvent::ReceiveGroupMessage {
                    text,
                    sender_id,
                    sender_name,
                    group_id,
                    timestamp: Utc::now(),
                };
                Ok(self.relay(&room, &event, conn))
            }
            ClientEvent::GroupTyping { group_id, sender_id, user_name } => {
                let room = self.member_room(&group_id, &sender_id, "group-typing")?;
                let event = ServerEvent::GroupTyping { group_id, sender_id, user_name };
                Ok(self.relay(&room, &event, conn))
            }
            ClientEvent::GroupStopTyping { group_id, sender_id, user_name } => {
                let room = self.member_room(&group_id, &sender_id, "group-stop-typing")?;
                let event = ServerEvent::GroupStopTyping { group_id, sender_id, user_name };
                Ok(self.relay(&room, &event, conn))
            }
        }
    }

    /// The claimed sender must be registered on the emitting connection.
    fn authorize(&self, conn: ConnectionId, event: &ClientEvent) -> Result<(), RelayError> {
        let sender = event.sender();
        if self.sessions.is_current(sender, conn) {
            Ok(())
        } else {
            Err(RelayError::UnregisteredSender {
                event: event.name(),
                sender: sender.to_string(),
            })
        }
    }

    fn member_room(
        &self,
        group_id: &str,
        sender_id: &str,
        event: &'static str,
    ) -> Result<RoomId, RelayError> {
        let room = self.resolver.group_room_id(group_id);
        if self.membership.is_member(&room, sender_id) {
            Ok(room)
        } else {
            Err(RelayError::NotAMember {
                event,
                group: group_id.to_string(),
                user: sender_id.to_string(),
            })
        }
    }

    fn relay(&self, room: &RoomId, event: &ServerEvent, origin: ConnectionId) -> Outcome {
        let delivered = self.bus.broadcast(room, event, Some(origin));
        Outcome::Relayed { delivered }
    }
}

use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::events::ServerEvent;
use super::registry::ConnectionId;
use super::room::RoomId;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Room-scoped fan-out over the outbound channel of every live connection.
#[derive(Debug, Default)]
pub struct PresenceEventBus {
    connections: HashMap<ConnectionId, EventSender>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl PresenceEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, conn: ConnectionId, sender: EventSender) {
        self.connections.insert(conn, sender);
        info!("Attached connection {} to event bus", conn);
    }

    /// Drops the connection's channel and every room subscription it holds.
    pub fn detach(&mut self, conn: ConnectionId) -> bool {
        self.rooms.retain(|_, subscribers| {
            subscribers.remove(&conn);
            !subscribers.is_empty()
        });
        let removed = self.connections.remove(&conn).is_some();
        if removed {
            info!("Detached connection {} from event bus", conn);
        }
        removed
    }

    pub fn subscribe(&mut self, room: &RoomId, conn: ConnectionId) -> bool {
        let added = self.rooms.entry(room.clone()).or_default().insert(conn);
        if added {
            debug!("Connection {} subscribed to room {}", conn, room);
        }
        added
    }

    pub fn unsubscribe(&mut self, room: &RoomId, conn: ConnectionId) -> bool {
        let Some(subscribers) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = subscribers.remove(&conn);
        if subscribers.is_empty() {
            self.rooms.remove(room);
        }
        if removed {
            debug!("Connection {} unsubscribed from room {}", conn, room);
        }
        removed
    }

    pub fn is_subscribed(&self, room: &RoomId, conn: ConnectionId) -> bool {
        self.rooms
            .get(room)
            .map_or(false, |subscribers| subscribers.contains(&conn))
    }

    pub fn subscriber_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Delivers `event` to every subscriber of `room` except `exclude`.
    /// Returns how many connections it was handed to.
    pub fn broadcast(
        &self,
        room: &RoomId,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(subscribers) = self.rooms.get(room) else {
            debug!("No subscribers in room {} for {}", room, event.name());
            return 0;
        };

        let mut delivered = 0;
        for conn in subscribers {
            if Some(*conn) == exclude {
                continue;
            }
            let Some(sender) = self.connections.get(conn) else {
                continue;
            };
            match sender.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => error!("Failed to deliver {} to connection {}: {}", event.name(), conn, e),
            }
        }

        debug!("Fanned out {} to {} connection(s) in room {}", event.name(), delivered, room);
        delivered
    }
}

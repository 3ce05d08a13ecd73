use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// User identifier issued by the identity provider.
pub type UserId = String;

/// Unique identifier of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which user currently owns which connection.
///
/// The in-memory [`ConnectionRegistry`] is process-local; a deployment with
/// several relay instances would provide a shared-store implementation.
pub trait SessionStore: Send {
    /// Binds `user` to `conn`, returning the connection it replaced.
    fn register(&mut self, user: UserId, conn: ConnectionId) -> Option<ConnectionId>;

    fn lookup(&self, user: &str) -> Option<ConnectionId>;

    /// User the connection last registered as, even if a newer connection
    /// has since taken over that user.
    fn user_of(&self, conn: ConnectionId) -> Option<UserId>;

    /// No-op when the user is not registered.
    fn remove(&mut self, user: &str);

    /// Forgets `conn` and returns the user it was registered as. The user's
    /// binding is dropped only while `conn` is still its current connection.
    fn release(&mut self, conn: ConnectionId) -> Option<UserId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `conn` is the live connection registered for `user`.
    fn is_current(&self, user: &str, conn: ConnectionId) -> bool {
        self.lookup(user) == Some(conn)
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: HashMap<UserId, ConnectionId>,
    by_connection: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for ConnectionRegistry {
    fn register(&mut self, user: UserId, conn: ConnectionId) -> Option<ConnectionId> {
        // A connection speaks for one user at a time.
        if let Some(previous_user) = self.by_connection.remove(&conn) {
            if previous_user != user && self.by_user.get(&previous_user) == Some(&conn) {
                self.by_user.remove(&previous_user);
                debug!("Connection {} no longer registered as {}", conn, previous_user);
            }
        }

        // The replaced connection keeps its reverse entry until it closes,
        // so the reaper can still unwind what it joined.
        let replaced = self.by_user.insert(user.clone(), conn);
        if let Some(old) = replaced.filter(|old| *old != conn) {
            info!("User {} re-registered, replacing connection {}", user, old);
        }
        self.by_connection.insert(conn, user);
        replaced
    }

    fn lookup(&self, user: &str) -> Option<ConnectionId> {
        self.by_user.get(user).copied()
    }

    fn user_of(&self, conn: ConnectionId) -> Option<UserId> {
        self.by_connection.get(&conn).cloned()
    }

    fn remove(&mut self, user: &str) {
        if let Some(conn) = self.by_user.remove(user) {
            self.by_connection.remove(&conn);
        }
    }

    fn release(&mut self, conn: ConnectionId) -> Option<UserId> {
        let user = self.by_connection.remove(&conn)?;
        if self.by_user.get(&user) == Some(&conn) {
            self.by_user.remove(&user);
        }
        Some(user)
    }

    fn len(&self) -> usize {
        self.by_user.len()
    }
}

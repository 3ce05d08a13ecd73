//! Relay core
//!
//! Presence and fan-out for direct conversations and peer-support groups.
//! All state is in memory and owned by one [`RelayService`]; nothing here
//! performs I/O beyond handing events to per-connection channels.

mod bus;
mod events;
mod membership;
mod reaper;
mod registry;
mod room;
mod service;

pub use bus::{EventSender, PresenceEventBus};
pub use events::{ClientEvent, RegisterPayload, ServerEvent};
pub use membership::{GroupMembershipTracker, JoinPolicy, MembershipChange, MembershipStore};
pub use reaper::{DisconnectReaper, ReapReport};
pub use registry::{ConnectionId, ConnectionRegistry, SessionStore, UserId};
pub use room::{RoomId, RoomResolver, DEFAULT_ROOM_SEPARATOR};
pub use service::{Outcome, RelayService, RelayStats};

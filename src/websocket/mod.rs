//! WebSocket transport for the relay
//!
//! Each connection is a [`RelaySession`] actor; all of them talk to a single
//! [`RelayHub`] actor that owns the relay state.

mod hub;
mod session;

pub use hub::{Connect, Disconnect, GetStats, Inbound, RelayHub};
pub use session::{decode_frame, encode_event, relay_route, RelaySession};

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ROOM_SEPARATOR: &str = "_";

/// Opaque identifier of a broadcast scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives room identifiers without any stored state.
#[derive(Debug, Clone)]
pub struct RoomResolver {
    separator: String,
}

impl Default for RoomResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_SEPARATOR)
    }
}

impl RoomResolver {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Room shared by two participants. Both sides compute the same id
    /// whatever order they pass the pair in.
    pub fn direct_room_id(&self, a: &str, b: &str) -> RoomId {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        RoomId(format!("{}{}{}", low, self.separator, high))
    }

    /// Group rooms are addressed by their pre-agreed group id.
    pub fn group_room_id(&self, group_id: &str) -> RoomId {
        RoomId(group_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_room_is_commutative() {
        let resolver = RoomResolver::default();
        let pairs = [("u1", "u2"), ("alice", "bob"), ("Zed", "amy"), ("", "x")];

        for (a, b) in pairs {
            assert_eq!(resolver.direct_room_id(a, b), resolver.direct_room_id(b, a));
        }
    }

    #[test]
    fn test_direct_room_sorts_and_joins() {
        let resolver = RoomResolver::default();
        assert_eq!(resolver.direct_room_id("u2", "u1").as_str(), "u1_u2");

        let resolver = RoomResolver::new(":");
        assert_eq!(resolver.direct_room_id("bob", "alice").to_string(), "alice:bob");
    }

    #[test]
    fn test_group_room_is_the_group_id() {
        let resolver = RoomResolver::default();
        assert_eq!(resolver.group_room_id("peer1").as_str(), "peer1");
    }
}

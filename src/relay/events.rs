use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::registry::UserId;

/// `register-user` payload. The mobile client sends the bare user id,
/// newer clients send an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterPayload {
    Object {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    Bare(UserId),
}

impl RegisterPayload {
    pub fn user_id(&self) -> &str {
        match self {
            RegisterPayload::Object { user_id } | RegisterPayload::Bare(user_id) => user_id,
        }
    }

    pub fn into_user_id(self) -> UserId {
        match self {
            RegisterPayload::Object { user_id } | RegisterPayload::Bare(user_id) => user_id,
        }
    }
}

/// Events a client emits. Commands change relay state, notifications are
/// only fanned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientEvent {
    RegisterUser(RegisterPayload),
    #[serde(rename_all = "camelCase")]
    JoinChat {
        user_id: UserId,
        recipient_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    JoinPeerGroup {
        group_id: String,
        user_id: UserId,
        #[serde(default)]
        user_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LeavePeerGroup { group_id: String, user_id: UserId },

    #[serde(rename_all = "camelCase")]
    PrivateMessage {
        sender_id: UserId,
        recipient_id: UserId,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        sender_id: UserId,
        recipient_id: UserId,
        #[serde(default)]
        user_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping {
        sender_id: UserId,
        recipient_id: UserId,
        #[serde(default)]
        user_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GroupMessage {
        group_id: String,
        sender_id: UserId,
        text: String,
        #[serde(default)]
        sender_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GroupTyping {
        group_id: String,
        sender_id: UserId,
        #[serde(default)]
        user_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GroupStopTyping {
        group_id: String,
        sender_id: UserId,
        #[serde(default)]
        user_name: Option<String>,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterUser(_) => "register-user",
            ClientEvent::JoinChat { .. } => "join-chat",
            ClientEvent::JoinPeerGroup { .. } => "join-peer-group",
            ClientEvent::LeavePeerGroup { .. } => "leave-peer-group",
            ClientEvent::PrivateMessage { .. } => "private-message",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StopTyping { .. } => "stop-typing",
            ClientEvent::GroupMessage { .. } => "group-message",
            ClientEvent::GroupTyping { .. } => "group-typing",
            ClientEvent::GroupStopTyping { .. } => "group-stop-typing",
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(
            self,
            ClientEvent::RegisterUser(_)
                | ClientEvent::JoinChat { .. }
                | ClientEvent::JoinPeerGroup { .. }
                | ClientEvent::LeavePeerGroup { .. }
        )
    }

    /// The user id the event claims to come from.
    pub fn sender(&self) -> &str {
        match self {
            ClientEvent::RegisterUser(payload) => payload.user_id(),
            ClientEvent::JoinChat { user_id, .. }
            | ClientEvent::JoinPeerGroup { user_id, .. }
            | ClientEvent::LeavePeerGroup { user_id, .. } => user_id,
            ClientEvent::PrivateMessage { sender_id, .. }
            | ClientEvent::Typing { sender_id, .. }
            | ClientEvent::StopTyping { sender_id, .. }
            | ClientEvent::GroupMessage { sender_id, .. }
            | ClientEvent::GroupTyping { sender_id, .. }
            | ClientEvent::GroupStopTyping { sender_id, .. } => sender_id,
        }
    }
}

/// Events the relay emits to room subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        text: String,
        sender_id: UserId,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        sender_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        user_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping {
        sender_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        user_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    UserJoinedGroup {
        user_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        user_name: Option<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UserLeftGroup {
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ReceiveGroupMessage {
        text: String,
        sender_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender_name: Option<String>,
        group_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    GroupTyping {
        group_id: String,
        sender_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        user_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GroupStopTyping {
        group_id: String,
        sender_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        user_name: Option<String>,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ReceiveMessage { .. } => "receive-message",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::StopTyping { .. } => "stop-typing",
            ServerEvent::UserJoinedGroup { .. } => "user-joined-group",
            ServerEvent::UserLeftGroup { .. } => "user-left-group",
            ServerEvent::ReceiveGroupMessage { .. } => "receive-group-message",
            ServerEvent::GroupTyping { .. } => "group-typing",
            ServerEvent::GroupStopTyping { .. } => "group-stop-typing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_accepts_object_and_bare_payloads() {
        let object: ClientEvent =
            serde_json::from_value(json!({"type": "register-user", "payload": {"userId": "u1"}}))
                .unwrap();
        let bare: ClientEvent =
            serde_json::from_value(json!({"type": "register-user", "payload": "u1"})).unwrap();

        assert_eq!(object.sender(), "u1");
        assert_eq!(bare.sender(), "u1");
        assert!(object.is_command());
    }

    #[test]
    fn test_parse_group_message() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "group-message",
            "payload": {"groupId": "peer1", "senderId": "u1", "text": "hello", "senderName": "Ada"}
        }))
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::GroupMessage {
                group_id: "peer1".into(),
                sender_id: "u1".into(),
                text: "hello".into(),
                sender_name: Some("Ada".into()),
            }
        );
        assert_eq!(event.name(), "group-message");
        assert!(!event.is_command());
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_value::<ClientEvent>(json!({"type": "shout", "payload": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::ReceiveMessage {
            text: "hi".into(),
            sender_id: "u1".into(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "receive-message");
        assert_eq!(value["payload"]["text"], "hi");
        assert_eq!(value["payload"]["senderId"], "u1");
        assert!(DateTime::parse_from_rfc3339(value["payload"]["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_stop_typing_omits_missing_user_name() {
        let event = ServerEvent::StopTyping {
            sender_id: "u1".into(),
            user_name: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "stop-typing", "payload": {"senderId": "u1"}}));
    }
}

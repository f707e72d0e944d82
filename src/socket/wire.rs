// Wire format for the bidirectional socket event surface. Every frame is a
// JSON envelope of the form {"event": "...", "data": {...}}; the event
// names are the protocol contract with the server.

use crate::error::{ChatError, Result};
use crate::models::{Conversation, Message};
use serde::{Deserialize, Serialize};

/// Events the client emits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinConversations { conversation_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: String,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    TypingStart { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStop { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    MarkRead { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    Ping { timestamp: i64, client_id: String },
}

impl ClientEvent {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Events the server delivers. Unknown event names are a protocol error;
/// the read loop logs and skips them rather than dropping the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionConfirmed {
        #[serde(default)]
        user_id: Option<String>,
    },
    RoomsJoined {
        rooms: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    RoomJoinError {
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    NewMessage(Message),
    #[serde(rename_all = "camelCase")]
    TypingStart {
        user_id: String,
        conversation_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TypingStop {
        user_id: String,
        conversation_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        conversation_id: String,
        user_id: String,
    },
    ConversationUpdate(Conversation),
    #[serde(rename_all = "camelCase")]
    ConversationDelete {
        conversation_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ConversationArchive {
        conversation_id: String,
        archived: bool,
    },
    #[serde(rename_all = "camelCase")]
    MessageDelete {
        conversation_id: String,
        message_id: String,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

impl ServerEvent {
    pub fn decode(raw: &str) -> Result<ServerEvent> {
        serde_json::from_str(raw)
            .map_err(|e| ChatError::Protocol(format!("unrecognized server frame: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_protocol_names() {
        let join = ClientEvent::JoinConversations {
            conversation_ids: vec!["c1".to_string(), "c2".to_string()],
        };
        let raw = join.encode().unwrap();
        assert!(raw.contains("\"event\":\"join-conversations\""));
        assert!(raw.contains("\"conversationIds\":[\"c1\",\"c2\"]"));

        let ping = ClientEvent::Ping {
            timestamp: 1700000000,
            client_id: "client-1".to_string(),
        };
        assert!(ping.encode().unwrap().contains("\"event\":\"ping\""));
    }

    #[test]
    fn server_events_round_trip() {
        let raw = r#"{"event":"messages-read","data":{"conversationId":"c1","userId":"u2"}}"#;
        let event = ServerEvent::decode(raw).unwrap();
        assert_eq!(
            event,
            ServerEvent::MessagesRead {
                conversation_id: "c1".to_string(),
                user_id: "u2".to_string(),
            }
        );

        assert!(ServerEvent::decode(r#"{"event":"no-such-event","data":{}}"#).is_err());
    }
}

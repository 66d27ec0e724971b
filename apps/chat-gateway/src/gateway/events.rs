//! Event types and wire-format frames exchanged over the socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rooms::RoomId;

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// Closed set of event types the gateway knows about.
///
/// Adding a variant is an additive change; the wire name is the camelCase
/// variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Connected,
    Disconnected,
    JoinChat,
    LeaveChat,
    Typing,
    StopTyping,
    MessageReceived,
    MessageDeleted,
    MessageEdited,
    MessageReaction,
    ChatDeleted,
    ChatUpdated,
    NewParticipantAdded,
    ParticipantLeft,
    NewChat,
    UserOnline,
    UserOffline,
    OnlineUsersList,
    SocketError,
}

impl EventKind {
    /// Whether the event describes a domain mutation that an outside caller
    /// may publish. Lifecycle and presence frames are produced by the gateway
    /// itself.
    pub fn is_domain_event(self) -> bool {
        matches!(
            self,
            EventKind::MessageReceived
                | EventKind::MessageDeleted
                | EventKind::MessageEdited
                | EventKind::MessageReaction
                | EventKind::ChatDeleted
                | EventKind::ChatUpdated
                | EventKind::NewParticipantAdded
                | EventKind::ParticipantLeft
                | EventKind::NewChat
        )
    }
}

// ---------------------------------------------------------------------------
// Server → Client frame
// ---------------------------------------------------------------------------

/// An immutable event pushed to one or more connections.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Display form of the target room; absent for direct frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl ServerEvent {
    /// Build an event addressed to a room.
    pub fn for_room(room: &RoomId, kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            target: Some(room.to_string()),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build an event addressed to a single connection.
    pub fn direct(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            target: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build a `socketError` frame carrying a human-readable message.
    pub fn socket_error(message: &str) -> Self {
        Self::direct(
            EventKind::SocketError,
            serde_json::json!({ "message": message }),
        )
    }
}

// ---------------------------------------------------------------------------
// Client → Server frame
// ---------------------------------------------------------------------------

/// A client-originated event. Each variant maps to one handler method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinChat(ChatRef),
    LeaveChat(ChatRef),
    Typing(ChatRef),
    StopTyping(ChatRef),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::JoinChat(_) => EventKind::JoinChat,
            ClientEvent::LeaveChat(_) => EventKind::LeaveChat,
            ClientEvent::Typing(_) => EventKind::Typing,
            ClientEvent::StopTyping(_) => EventKind::StopTyping,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatRef {
    #[serde(rename = "chatId")]
    pub chat_id: String,
}

//! Room identifiers and the room manager.
//!
//! Rooms are never declared up front: a room exists while at least one
//! connection is subscribed to it and disappears with its last member.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use super::registry::{RegistryError, SessionRegistry};
use super::session::ConnectionId;

const CHAT_PREFIX: &str = "chat:";
const USER_PREFIX: &str = "user:";

/// Longest chat or user id accepted in a room id.
const MAX_ROOM_ID_LEN: usize = 128;

/// A broadcast target. Chat rooms and personal rooms are separate variants,
/// so a chat id can never collide with a user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomId {
    Chat(String),
    User(String),
}

impl RoomId {
    pub fn chat(chat_id: impl Into<String>) -> Self {
        RoomId::Chat(chat_id.into())
    }

    /// The personal room every connection of `user_id` is subscribed to.
    pub fn user(user_id: impl Into<String>) -> Self {
        RoomId::User(user_id.into())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Chat(id) => write!(f, "{CHAT_PREFIX}{id}"),
            RoomId::User(id) => write!(f, "{USER_PREFIX}{id}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid room id: {0}")]
pub struct InvalidRoomId(pub String);

/// Parses `chat:{id}` or `user:{id}`. A bare string is taken as a chat id.
/// The id part is checked the same way as [`chat_room`].
impl FromStr for RoomId {
    type Err = InvalidRoomId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix(USER_PREFIX) {
            Ok(RoomId::user(checked_id(id, s)?))
        } else if let Some(id) = s.strip_prefix(CHAT_PREFIX) {
            Ok(RoomId::chat(checked_id(id, s)?))
        } else {
            chat_room(s)
        }
    }
}

/// Validate a chat id coming from a client frame.
pub fn chat_room(chat_id: &str) -> Result<RoomId, InvalidRoomId> {
    checked_id(chat_id, chat_id).map(RoomId::chat)
}

/// Trim `id` and reject it if empty, too long or containing whitespace.
/// `raw` is the full input echoed back in the error.
fn checked_id<'a>(id: &'a str, raw: &str) -> Result<&'a str, InvalidRoomId> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || trimmed.len() > MAX_ROOM_ID_LEN
        || trimmed.chars().any(char::is_whitespace)
    {
        return Err(InvalidRoomId(raw.to_string()));
    }
    Ok(trimmed)
}

/// Room membership operations, layered on the registry's join/leave
/// primitives.
pub struct RoomManager {
    registry: Arc<SessionRegistry>,
}

impl RoomManager {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Subscribe a connection to a room. Joining twice is a no-op.
    pub fn join(&self, connection_id: &ConnectionId, room: &RoomId) -> Result<(), RegistryError> {
        if self.registry.join(connection_id, room)? {
            tracing::debug!(connection_id = %connection_id, room = %room, "joined room");
        }
        Ok(())
    }

    /// Unsubscribe a connection. Leaving a room one is not in is a no-op.
    pub fn leave(&self, connection_id: &ConnectionId, room: &RoomId) {
        if self.registry.leave(connection_id, room) {
            tracing::debug!(connection_id = %connection_id, room = %room, "left room");
        }
    }

    pub fn members(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.registry.members(room)
    }

    pub fn is_member(&self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        self.registry.is_member(connection_id, room)
    }

    /// Rooms the connection is subscribed to, or an empty set once it's gone.
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> HashSet<RoomId> {
        self.registry.rooms_of(connection_id).unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.registry.stats().rooms
    }
}

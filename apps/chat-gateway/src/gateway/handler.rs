//! Client event handling for one connection.
//!
//! Each inbound frame is parsed into a [`ClientEvent`] and routed by variant
//! to a single method. Failures are reported back to the sender as a
//! `socketError` frame; the connection stays open.

use std::sync::Arc;

use serde_json::json;

use super::dispatch::EventDispatcher;
use super::events::{ChatRef, ClientEvent, EventKind, ServerEvent};
use super::rooms::{chat_room, RoomId, RoomManager};
use super::session::ConnectionId;

pub struct ConnectionHandler {
    connection_id: ConnectionId,
    user_id: String,
    rooms: Arc<RoomManager>,
    dispatcher: Arc<EventDispatcher>,
}

impl ConnectionHandler {
    pub(crate) fn new(
        connection_id: ConnectionId,
        user_id: String,
        rooms: Arc<RoomManager>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            rooms,
            dispatcher,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Parse and handle one text frame.
    pub fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle(event),
            Err(e) => {
                tracing::debug!(connection_id = %self.connection_id, error = %e, "unparseable client frame");
                self.reply_error("Unrecognized event");
            }
        }
    }

    pub fn handle(&self, event: ClientEvent) {
        let kind = event.kind();
        let result = match event {
            ClientEvent::JoinChat(chat) => self.join_chat(chat),
            ClientEvent::LeaveChat(chat) => self.leave_chat(chat),
            ClientEvent::Typing(chat) => self.relay_typing(chat, EventKind::Typing),
            ClientEvent::StopTyping(chat) => self.relay_typing(chat, EventKind::StopTyping),
        };
        if let Err(message) = result {
            tracing::debug!(
                connection_id = %self.connection_id,
                event = ?kind,
                reason = %message,
                "client event rejected"
            );
            self.reply_error(message);
        }
    }

    fn join_chat(&self, chat: ChatRef) -> Result<(), &'static str> {
        let room = self.room_for(&chat)?;
        self.rooms
            .join(&self.connection_id, &room)
            .map_err(|_| "Cannot join chat")?;
        self.reply(EventKind::JoinChat, &chat);
        Ok(())
    }

    fn leave_chat(&self, chat: ChatRef) -> Result<(), &'static str> {
        let room = self.room_for(&chat)?;
        self.rooms.leave(&self.connection_id, &room);
        self.reply(EventKind::LeaveChat, &chat);
        Ok(())
    }

    /// Relay a typing indicator to the other members of the chat.
    fn relay_typing(&self, chat: ChatRef, kind: EventKind) -> Result<(), &'static str> {
        let room = self.room_for(&chat)?;
        if !self.rooms.is_member(&self.connection_id, &room) {
            return Err("Not a member of this chat");
        }
        self.dispatcher.publish_except(
            &room,
            &self.connection_id,
            kind,
            json!({ "chatId": chat.chat_id.trim(), "userId": self.user_id }),
        );
        Ok(())
    }

    fn room_for(&self, chat: &ChatRef) -> Result<RoomId, &'static str> {
        chat_room(&chat.chat_id).map_err(|_| "Invalid chat id")
    }

    fn reply(&self, kind: EventKind, chat: &ChatRef) {
        self.dispatcher.send_to(
            &self.connection_id,
            ServerEvent::direct(kind, json!({ "chatId": chat.chat_id.trim() })),
        );
    }

    fn reply_error(&self, message: &str) {
        self.dispatcher
            .send_to(&self.connection_id, ServerEvent::socket_error(message));
    }
}

//! Per-user presence derived from registry transitions.
//!
//! A user is online iff the registry holds at least one live connection for
//! them. Nothing is stored here: the tracker only reacts to the 0 → 1 and
//! 1 → 0 edges reported by the registry and broadcasts them.
//!
//! If a client reconnects before its old socket has been torn down the count
//! goes 1 → 2 → 1 and no event is emitted. If the old socket goes first the
//! other users see a `userOffline` immediately followed by `userOnline`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use super::dispatch::EventDispatcher;
use super::events::{EventKind, ServerEvent};
use super::registry::{RegistryError, Removal, SessionRegistry};
use super::session::{Connection, ConnectionId};

pub struct PresenceTracker {
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<EventDispatcher>,
    /// Held across a registry transition and its broadcast so that two
    /// transitions for the same user are announced in the order they happened.
    transitions: Mutex<()>,
}

impl PresenceTracker {
    pub fn new(registry: Arc<SessionRegistry>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
            transitions: Mutex::new(()),
        }
    }

    /// Register a connection, send it the online snapshot, and announce the
    /// user to everyone else if this is their first device.
    pub fn connect(&self, connection: Connection) -> Result<ConnectionId, RegistryError> {
        let _transition = self.transitions.lock();
        let registration = self.registry.register(connection)?;

        self.dispatcher.send_to(
            &registration.connection_id,
            ServerEvent::direct(
                EventKind::OnlineUsersList,
                json!({ "users": registration.online_users }),
            ),
        );

        if registration.first_for_user {
            tracing::info!(user_id = %registration.user_id, "user online");
            self.dispatcher.broadcast_except_user(
                &registration.user_id,
                EventKind::UserOnline,
                json!({ "userId": registration.user_id }),
            );
        }

        Ok(registration.connection_id)
    }

    /// Unregister a connection and announce the user offline if it was their
    /// last device. Returns `None` if the connection was already gone.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Option<Removal> {
        let _transition = self.transitions.lock();
        let removal = self.registry.unregister(connection_id)?;

        if removal.last_for_user {
            tracing::info!(user_id = %removal.identity.id, "user offline");
            self.dispatcher.broadcast_except_user(
                &removal.identity.id,
                EventKind::UserOffline,
                json!({ "userId": removal.identity.id }),
            );
        }

        Some(removal)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.registry.live_count(user_id) > 0
    }

    pub fn online_users(&self) -> Vec<String> {
        self.registry.online_users()
    }
}

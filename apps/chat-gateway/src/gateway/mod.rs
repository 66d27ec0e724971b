//! Realtime core: admission, rooms, presence and event fan-out.

pub mod dispatch;
pub mod events;
pub mod gate;
pub mod handler;
pub mod notify;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod server;
pub mod session;

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

use dispatch::{EventDispatcher, Publisher};
use events::{EventKind, ServerEvent};
use gate::{ConnectionGate, GateError};
use handler::ConnectionHandler;
use notify::ChatNotifier;
use presence::PresenceTracker;
use registry::{RegistryError, RegistryStats, SessionRegistry};
use rooms::RoomManager;
use session::{Connection, ConnectionId};

/// Close code used when a registry invariant rejects an admitted socket.
pub const CLOSE_INTERNAL: u16 = 4000;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ConnectError {
    pub fn close_code(&self) -> u16 {
        match self {
            ConnectError::Gate(e) => e.close_code(),
            ConnectError::Registry(_) => CLOSE_INTERNAL,
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            ConnectError::Gate(e) => e.client_message(),
            ConnectError::Registry(_) => "Connection rejected",
        }
    }
}

/// Entry point for the transport. One instance per process, shared by every
/// socket task and the internal publish endpoint.
pub struct Gateway {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomManager>,
    dispatcher: Arc<EventDispatcher>,
    presence: PresenceTracker,
    gate: ConnectionGate,
}

impl Gateway {
    pub fn new(gate: ConnectionGate) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomManager::new(registry.clone()));
        let dispatcher = Arc::new(EventDispatcher::new(registry.clone()));
        let presence = PresenceTracker::new(registry.clone(), dispatcher.clone());
        Self {
            registry,
            rooms,
            dispatcher,
            presence,
            gate,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// The outbound publish API handed to the rest of the application.
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        self.dispatcher.clone()
    }

    /// Typed chat notifications over [`Gateway::publisher`].
    pub fn notifier(&self) -> ChatNotifier {
        ChatNotifier::new(self.publisher())
    }

    /// Admit a socket. On success the connection is registered, has received
    /// `connected` and `onlineUsersList`, and other users have been told it
    /// came online if this is the user's first device. On failure nothing
    /// was registered.
    pub async fn on_connect(
        &self,
        token: Option<&str>,
        outbound: mpsc::Sender<Arc<ServerEvent>>,
    ) -> Result<ConnectionId, ConnectError> {
        let identity = self.gate.admit(token).await?;
        let connection = Connection::new(identity, outbound);

        let hello = ServerEvent::direct(
            EventKind::Connected,
            json!({ "userId": connection.user_id(), "connectionId": connection.id.as_str() }),
        );
        if let Err(err) = connection.send(Arc::new(hello)) {
            tracing::warn!(connection_id = %connection.id, error = %err, "could not queue connected frame");
        }

        let user_id = connection.identity.id.clone();
        let connection_id = self.presence.connect(connection).inspect_err(|e| {
            tracing::error!(%user_id, error = %e, "registration failed");
        })?;

        tracing::info!(%connection_id, %user_id, "socket connected");
        Ok(connection_id)
    }

    /// Build the handler for a registered connection. The transport builds
    /// one per socket and feeds it every frame.
    pub fn handler_for(&self, connection_id: &ConnectionId) -> Option<ConnectionHandler> {
        let identity = self.registry.identity_of(connection_id)?;
        Some(ConnectionHandler::new(
            connection_id.clone(),
            identity.id,
            self.rooms.clone(),
            self.dispatcher.clone(),
        ))
    }

    /// Handle one inbound text frame without a long-lived handler. Frames
    /// from unknown connections are ignored.
    pub fn on_client_event(&self, connection_id: &ConnectionId, text: &str) {
        match self.handler_for(connection_id) {
            Some(handler) => handler.handle_frame(text),
            None => tracing::debug!(%connection_id, "frame from unregistered connection ignored"),
        }
    }

    /// Tear down a connection. Safe to call more than once.
    pub fn on_disconnect(&self, connection_id: &ConnectionId) {
        if let Some(removal) = self.presence.disconnect(connection_id) {
            tracing::info!(
                %connection_id,
                user_id = %removal.identity.id,
                rooms = removal.rooms.len(),
                "socket disconnected"
            );
        }
    }

    /// Disconnect every device of a user, e.g. after their account was
    /// removed. Each socket is told why before it is unregistered; dropping
    /// the registry's sender then ends its transport loop. Returns the number
    /// of connections removed.
    pub fn disconnect_user(&self, user_id: &str, reason: &str) -> usize {
        let mut removed = 0;
        for connection_id in self.registry.connections_for_user(user_id) {
            self.dispatcher.send_to(
                &connection_id,
                ServerEvent::direct(EventKind::Disconnected, json!({ "reason": reason })),
            );
            if self.presence.disconnect(&connection_id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(%user_id, %reason, connections = removed, "user disconnected by server");
        }
        removed
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

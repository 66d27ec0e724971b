//! Per-connection handle held by the session registry.

use std::fmt;
use std::sync::Arc;

use chat_common::id::prefix;
use chat_common::PrefixedId;
use tokio::sync::mpsc;

use crate::auth::Identity;

use super::dispatch::DeliveryError;
use super::events::ServerEvent;

/// Process-unique identifier of one live socket (`conn_` prefixed ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnectionId {
    pub fn generate() -> Self {
        Self(<Self as PrefixedId>::generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated connection ready for registry admission.
///
/// The outbound sender is the only way to reach the socket; the transport
/// task owns the matching receiver.
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
    outbound: mpsc::Sender<Arc<ServerEvent>>,
}

impl Connection {
    pub fn new(identity: Identity, outbound: mpsc::Sender<Arc<ServerEvent>>) -> Self {
        Self::with_id(ConnectionId::generate(), identity, outbound)
    }

    pub fn with_id(
        id: ConnectionId,
        identity: Identity,
        outbound: mpsc::Sender<Arc<ServerEvent>>,
    ) -> Self {
        Self {
            id,
            identity,
            outbound,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.id
    }

    /// Queue an event without waiting. A full buffer or a dropped receiver
    /// is reported as a delivery failure.
    pub(crate) fn send(&self, event: Arc<ServerEvent>) -> Result<(), DeliveryError> {
        self.outbound.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.identity.id)
            .finish()
    }
}

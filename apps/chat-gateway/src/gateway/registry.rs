//! Session registry: live connections, the per-user device index and room
//! membership.
//!
//! All three indexes sit behind one `parking_lot::RwLock` so that register,
//! unregister, join and leave are all-or-nothing from the point of view of a
//! reader. A dispatch that holds the read lock can never observe a connection
//! that is half torn down.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::auth::Identity;

use super::dispatch::Audience;
use super::rooms::RoomId;
use super::session::{Connection, ConnectionId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    DuplicateRegistration(ConnectionId),
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("room {0} is another user's personal room")]
    ForeignPersonalRoom(RoomId),
}

/// Result of a successful `register`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub connection_id: ConnectionId,
    pub user_id: String,
    /// True when this is the user's only live connection (0 → 1).
    pub first_for_user: bool,
    /// Online user ids, taken under the same lock as the insert.
    pub online_users: Vec<String>,
}

/// Result of a successful `unregister`.
#[derive(Debug, Clone)]
pub struct Removal {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    /// Every room the connection belonged to, sorted.
    pub rooms: Vec<RoomId>,
    /// True when the user has no live connection left (1 → 0).
    pub last_for_user: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub connections: usize,
    pub rooms: usize,
    pub online_users: usize,
}

struct ConnectionEntry {
    connection: Connection,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    users: HashMap<String, HashSet<ConnectionId>>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RegistryState {
    /// Drop `id` from a room's member set, removing the room once empty.
    fn remove_member(&mut self, room: &RoomId, id: &ConnectionId) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(members) => {
                members.remove(id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove(room);
        }
    }
}

/// Explicitly constructed registry; share it behind an `Arc`.
#[derive(Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an authenticated connection and subscribe it to its personal room.
    pub fn register(&self, connection: Connection) -> Result<Registration, RegistryError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if state.connections.contains_key(&connection.id) {
            return Err(RegistryError::DuplicateRegistration(connection.id.clone()));
        }

        let id = connection.id.clone();
        let user_id = connection.user_id().to_string();
        let personal = RoomId::user(&user_id);

        let devices = state.users.entry(user_id.clone()).or_default();
        devices.insert(id.clone());
        let first_for_user = devices.len() == 1;

        state
            .rooms
            .entry(personal.clone())
            .or_default()
            .insert(id.clone());
        state.connections.insert(
            id.clone(),
            ConnectionEntry {
                connection,
                rooms: HashSet::from([personal]),
            },
        );

        let mut online_users: Vec<String> = state.users.keys().cloned().collect();
        online_users.sort();

        Ok(Registration {
            connection_id: id,
            user_id,
            first_for_user,
            online_users,
        })
    }

    /// Remove a connection from the registry and from every room it was in.
    ///
    /// Returns `None` if the connection is already gone, so duplicate close
    /// events are harmless.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Removal> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let entry = state.connections.remove(id)?;
        for room in &entry.rooms {
            state.remove_member(room, id);
        }

        let user_id = entry.connection.user_id().to_string();
        let last_for_user = match state.users.get_mut(&user_id) {
            Some(devices) => {
                devices.remove(id);
                devices.is_empty()
            }
            None => true,
        };
        if last_for_user {
            state.users.remove(&user_id);
        }

        let mut rooms: Vec<RoomId> = entry.rooms.into_iter().collect();
        rooms.sort();

        Some(Removal {
            connection_id: entry.connection.id,
            identity: entry.connection.identity,
            rooms,
            last_for_user,
        })
    }

    /// Add a connection to a room. Returns `false` if it was already a member.
    pub(crate) fn join(&self, id: &ConnectionId, room: &RoomId) -> Result<bool, RegistryError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let entry = state
            .connections
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.clone()))?;

        if let RoomId::User(owner) = room {
            if owner != &entry.connection.identity.id {
                return Err(RegistryError::ForeignPersonalRoom(room.clone()));
            }
        }

        if !entry.rooms.insert(room.clone()) {
            return Ok(false);
        }
        state.rooms.entry(room.clone()).or_default().insert(id.clone());
        Ok(true)
    }

    /// Remove a connection from a room. Returns `false` when nothing changed.
    ///
    /// A connection stays in its own personal room until it unregisters.
    pub(crate) fn leave(&self, id: &ConnectionId, room: &RoomId) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(entry) = state.connections.get_mut(id) else {
            return false;
        };
        if matches!(room, RoomId::User(owner) if owner == &entry.connection.identity.id) {
            return false;
        }
        if !entry.rooms.remove(room) {
            return false;
        }
        state.remove_member(room, id);
        true
    }

    /// Current members of a room; empty for a room nobody has joined.
    pub fn members(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.state
            .read()
            .rooms
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_member(&self, id: &ConnectionId, room: &RoomId) -> bool {
        self.state
            .read()
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(id))
    }

    pub fn rooms_of(&self, id: &ConnectionId) -> Option<HashSet<RoomId>> {
        self.state
            .read()
            .connections
            .get(id)
            .map(|entry| entry.rooms.clone())
    }

    pub fn connections_for_user(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.state
            .read()
            .users
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn live_count(&self, user_id: &str) -> usize {
        self.state
            .read()
            .users
            .get(user_id)
            .map_or(0, HashSet::len)
    }

    pub fn identity_of(&self, id: &ConnectionId) -> Option<Identity> {
        self.state
            .read()
            .connections
            .get(id)
            .map(|entry| entry.connection.identity.clone())
    }

    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.state.read().connections.contains_key(id)
    }

    /// Ids of every user with at least one live connection, sorted.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.state.read().users.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            connections: state.connections.len(),
            rooms: state.rooms.len(),
            online_users: state.users.len(),
        }
    }

    /// Visit every live connection in `audience` while holding the read lock.
    pub(crate) fn for_each_target<F>(&self, audience: &Audience<'_>, mut visit: F)
    where
        F: FnMut(&Connection),
    {
        let state = self.state.read();
        match audience {
            Audience::Room { room, except } => {
                let Some(members) = state.rooms.get(*room) else {
                    return;
                };
                for id in members {
                    if *except == Some(id) {
                        continue;
                    }
                    if let Some(entry) = state.connections.get(id) {
                        visit(&entry.connection);
                    }
                }
            }
            Audience::Connection(id) => {
                if let Some(entry) = state.connections.get(*id) {
                    visit(&entry.connection);
                }
            }
            Audience::AllExceptUser(user_id) => {
                for entry in state.connections.values() {
                    if entry.connection.user_id() != *user_id {
                        visit(&entry.connection);
                    }
                }
            }
        }
    }
}

//! Event dispatcher: pushes events to every live connection in a target.
//!
//! Delivery is best-effort. Each connection is tried independently; a closed
//! or saturated outbound buffer is logged and skipped, and the broadcast
//! carries on. Targets without live connections drop the event.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::events::{EventKind, ServerEvent};
use super::registry::SessionRegistry;
use super::rooms::RoomId;
use super::session::ConnectionId;

/// Why a single connection did not receive an event.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("outbound buffer full")]
    BufferFull,
}

/// Set of connections an event is resolved to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Audience<'a> {
    Room {
        room: &'a RoomId,
        except: Option<&'a ConnectionId>,
    },
    Connection(&'a ConnectionId),
    AllExceptUser(&'a str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Outbound API for the rest of the application.
///
/// Called after a mutation has been committed. Never fails: there is nothing
/// a caller could roll back if a notification does not arrive. A
/// cross-process fan-out can implement this trait in place of
/// [`EventDispatcher`].
pub trait Publisher: Send + Sync {
    fn publish(&self, target: &RoomId, kind: EventKind, payload: Value);
}

pub struct EventDispatcher {
    registry: Arc<SessionRegistry>,
    /// Serializes deliveries so every member of a room sees publishes in
    /// issue order.
    order: Mutex<()>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            order: Mutex::new(()),
        }
    }

    /// Deliver to every connection subscribed to `target`.
    pub fn publish_to(&self, target: &RoomId, kind: EventKind, payload: Value) -> DeliveryReport {
        let event = ServerEvent::for_room(target, kind, payload);
        self.deliver(
            Audience::Room {
                room: target,
                except: None,
            },
            event,
        )
    }

    /// Deliver to a room, skipping the originating connection.
    pub fn publish_except(
        &self,
        target: &RoomId,
        except: &ConnectionId,
        kind: EventKind,
        payload: Value,
    ) -> DeliveryReport {
        let event = ServerEvent::for_room(target, kind, payload);
        self.deliver(
            Audience::Room {
                room: target,
                except: Some(except),
            },
            event,
        )
    }

    /// Deliver to one connection.
    pub fn send_to(&self, connection_id: &ConnectionId, event: ServerEvent) -> DeliveryReport {
        self.deliver(Audience::Connection(connection_id), event)
    }

    /// Deliver to every connection not owned by `user_id`.
    pub fn broadcast_except_user(&self, user_id: &str, kind: EventKind, payload: Value) -> DeliveryReport {
        self.deliver(Audience::AllExceptUser(user_id), ServerEvent::direct(kind, payload))
    }

    fn deliver(&self, audience: Audience<'_>, event: ServerEvent) -> DeliveryReport {
        let kind = event.kind;
        let event = Arc::new(event);
        let mut report = DeliveryReport::default();

        let _order = self.order.lock();
        self.registry.for_each_target(&audience, |connection| {
            match connection.send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        connection_id = %connection.id,
                        user_id = %connection.user_id(),
                        event = ?kind,
                        error = %err,
                        "event delivery failed"
                    );
                }
            }
        });

        if report.delivered == 0 && report.failed == 0 {
            tracing::debug!(?audience, event = ?kind, "no live connections, event dropped");
        }
        report
    }
}

impl Publisher for EventDispatcher {
    fn publish(&self, target: &RoomId, kind: EventKind, payload: Value) {
        self.publish_to(target, kind, payload);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;
    use crate::gateway::testing::{connection, drain};

    fn setup() -> (Arc<SessionRegistry>, EventDispatcher) {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = EventDispatcher::new(registry.clone());
        (registry, dispatcher)
    }

    #[test]
    fn publish_reaches_room_member() {
        let (registry, dispatcher) = setup();
        let (conn, mut rx) = connection("conn1", "alice");
        registry.register(conn).unwrap();
        registry.join(&ConnectionId::from("conn1"), &RoomId::chat("chat-42")).unwrap();

        let report = dispatcher.publish_to(
            &RoomId::chat("chat-42"),
            EventKind::MessageReceived,
            json!({"text": "hi"}),
        );
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 0 });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MessageReceived);
        assert_eq!(events[0].payload, json!({"text": "hi"}));
        assert_eq!(events[0].target.as_deref(), Some("chat:chat-42"));
    }

    #[test]
    fn broken_connection_does_not_stop_broadcast() {
        let (registry, dispatcher) = setup();
        let chat = RoomId::chat("42");
        let (c1, mut rx1) = connection("c1", "alice");
        let (c2, rx2) = connection("c2", "bob");
        let (c3, mut rx3) = connection("c3", "carol");
        for conn in [c1, c2, c3] {
            let id = conn.id.clone();
            registry.register(conn).unwrap();
            registry.join(&id, &chat).unwrap();
        }
        drop(rx2);

        let report = dispatcher.publish_to(&chat, EventKind::MessageDeleted, json!({"id": 7}));
        assert_eq!(report, DeliveryReport { delivered: 2, failed: 1 });
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx3).len(), 1);
    }

    #[test]
    fn full_buffer_counts_as_failure() {
        let (registry, dispatcher) = setup();
        let (conn, mut rx) = crate::gateway::testing::connection_with_capacity("c1", "alice", 1);
        registry.register(conn).unwrap();
        let room = RoomId::user("alice");

        assert_eq!(dispatcher.publish_to(&room, EventKind::NewChat, json!(1)).delivered, 1);
        assert_eq!(dispatcher.publish_to(&room, EventKind::NewChat, json!(2)).failed, 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn publish_to_empty_target_is_dropped() {
        let (_registry, dispatcher) = setup();
        let report = dispatcher.publish_to(&RoomId::chat("nobody"), EventKind::ChatUpdated, json!({}));
        assert_eq!(report, DeliveryReport::default());
    }

    #[test]
    fn personal_room_is_isolated_from_shared_chats() {
        let (registry, dispatcher) = setup();
        let chat = RoomId::chat("shared");
        let (a, mut rx_a) = connection("a1", "alice");
        let (b, mut rx_b) = connection("b1", "bob");
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        registry.join(&ConnectionId::from("a1"), &chat).unwrap();
        registry.join(&ConnectionId::from("b1"), &chat).unwrap();

        dispatcher.publish_to(&RoomId::user("alice"), EventKind::NewChat, json!({"chat": "x"}));

        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn publish_except_skips_origin() {
        let (registry, dispatcher) = setup();
        let chat = RoomId::chat("42");
        let (a, mut rx_a) = connection("a1", "alice");
        let (b, mut rx_b) = connection("b1", "bob");
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        registry.join(&ConnectionId::from("a1"), &chat).unwrap();
        registry.join(&ConnectionId::from("b1"), &chat).unwrap();

        let report = dispatcher.publish_except(&chat, &ConnectionId::from("a1"), EventKind::Typing, json!({}));
        assert_eq!(report.delivered, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b)[0].kind, EventKind::Typing);
    }

    #[test]
    fn broadcast_except_user_skips_all_of_that_users_devices() {
        let (registry, dispatcher) = setup();
        let mut receivers = Vec::new();
        for (id, user) in [("a1", "alice"), ("a2", "alice"), ("b1", "bob"), ("c1", "carol")] {
            let (conn, rx) = connection(id, user);
            registry.register(conn).unwrap();
            receivers.push((user, rx));
        }

        let report = dispatcher.broadcast_except_user("alice", EventKind::UserOnline, json!({"userId": "alice"}));
        assert_eq!(report.delivered, 2);

        let mut reached = HashSet::new();
        for (user, rx) in receivers.iter_mut() {
            if !drain(rx).is_empty() {
                reached.insert(*user);
            }
        }
        assert_eq!(reached, HashSet::from(["bob", "carol"]));
    }

    #[test]
    fn room_events_arrive_in_publish_order() {
        let (registry, dispatcher) = setup();
        let chat = RoomId::chat("42");
        let (conn, mut rx) = connection("c1", "alice");
        registry.register(conn).unwrap();
        registry.join(&ConnectionId::from("c1"), &chat).unwrap();

        dispatcher.publish_to(&chat, EventKind::ChatUpdated, json!({"n": 1}));
        dispatcher.publish_to(&chat, EventKind::MessageReceived, json!({"n": 2}));
        dispatcher.publish_to(&chat, EventKind::MessageEdited, json!({"n": 3}));

        let kinds: Vec<EventKind> = drain(&mut rx).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::ChatUpdated, EventKind::MessageReceived, EventKind::MessageEdited]
        );
    }

    #[test]
    fn publisher_trait_object_delivers() {
        let (registry, dispatcher) = setup();
        let (conn, mut rx) = connection("c1", "alice");
        registry.register(conn).unwrap();

        let publisher: Arc<dyn Publisher> = Arc::new(dispatcher);
        publisher.publish(&RoomId::user("alice"), EventKind::ChatDeleted, json!({"chatId": "9"}));
        assert_eq!(drain(&mut rx)[0].kind, EventKind::ChatDeleted);
    }
}

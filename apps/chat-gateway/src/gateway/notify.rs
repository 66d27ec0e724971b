//! Chat notifications published after a mutation has been persisted.
//!
//! Every event here goes to participants' personal rooms, so a participant is
//! reached on every device whether or not the chat is open on it.

use std::sync::Arc;

use serde_json::{json, Value};

use super::dispatch::Publisher;
use super::events::EventKind;
use super::rooms::RoomId;

pub struct ChatNotifier {
    publisher: Arc<dyn Publisher>,
}

impl ChatNotifier {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    /// A new message was sent by `sender`.
    pub fn message_received(&self, participants: &[String], sender: &str, message: Value) {
        self.to_participants_except(participants, sender, EventKind::MessageReceived, message);
    }

    pub fn message_edited(&self, participants: &[String], editor: &str, message: Value) {
        self.to_participants_except(participants, editor, EventKind::MessageEdited, message);
    }

    pub fn message_deleted(&self, participants: &[String], deleter: &str, message: Value) {
        self.to_participants_except(participants, deleter, EventKind::MessageDeleted, message);
    }

    /// A reaction changed; the reacting user also sees it on their other
    /// devices.
    pub fn message_reaction(&self, participants: &[String], reaction: Value) {
        self.to_participants(participants, EventKind::MessageReaction, reaction);
    }

    pub fn chat_updated(&self, participants: &[String], chat: Value) {
        self.to_participants(participants, EventKind::ChatUpdated, chat);
    }

    pub fn chat_deleted(&self, participants: &[String], chat: Value) {
        self.to_participants(participants, EventKind::ChatDeleted, chat);
    }

    /// A chat was created by `creator`; everyone else learns about it.
    pub fn new_chat(&self, participants: &[String], creator: &str, chat: Value) {
        self.to_participants_except(participants, creator, EventKind::NewChat, chat);
    }

    /// `added` joined the chat: they receive the chat itself, existing
    /// participants receive the membership change.
    pub fn participant_added(&self, participants: &[String], added: &str, chat: Value) {
        self.publisher
            .publish(&RoomId::user(added), EventKind::NewChat, chat.clone());
        self.to_participants_except(
            participants,
            added,
            EventKind::NewParticipantAdded,
            json!({ "userId": added, "chat": chat }),
        );
    }

    /// `left` is no longer in the chat: it disappears for them, the remaining
    /// participants receive the membership change.
    pub fn participant_left(&self, participants: &[String], left: &str, chat: Value) {
        self.publisher
            .publish(&RoomId::user(left), EventKind::ChatDeleted, chat.clone());
        self.to_participants_except(
            participants,
            left,
            EventKind::ParticipantLeft,
            json!({ "userId": left, "chat": chat }),
        );
    }

    fn to_participants(&self, participants: &[String], kind: EventKind, payload: Value) {
        for user_id in participants {
            self.publisher.publish(&RoomId::user(user_id), kind, payload.clone());
        }
    }

    fn to_participants_except(
        &self,
        participants: &[String],
        actor: &str,
        kind: EventKind,
        payload: Value,
    ) {
        for user_id in participants.iter().filter(|p| p.as_str() != actor) {
            self.publisher.publish(&RoomId::user(user_id), kind, payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(RoomId, EventKind, Value)>>,
    }

    impl Publisher for Recorder {
        fn publish(&self, target: &RoomId, kind: EventKind, payload: Value) {
            self.calls.lock().push((target.clone(), kind, payload));
        }
    }

    fn notifier() -> (Arc<Recorder>, ChatNotifier) {
        let recorder = Arc::new(Recorder::default());
        (recorder.clone(), ChatNotifier::new(recorder))
    }

    fn users(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn message_received_skips_sender() {
        let (recorder, notifier) = notifier();
        notifier.message_received(&users(&["alice", "bob", "carol"]), "alice", json!({"text": "hi"}));

        let calls = recorder.calls.lock();
        let targets: Vec<&RoomId> = calls.iter().map(|(t, _, _)| t).collect();
        assert_eq!(targets, vec![&RoomId::user("bob"), &RoomId::user("carol")]);
        assert!(calls.iter().all(|(_, k, _)| *k == EventKind::MessageReceived));
    }

    #[test]
    fn reaction_reaches_everyone() {
        let (recorder, notifier) = notifier();
        notifier.message_reaction(&users(&["alice", "bob"]), json!({"emoji": "+1"}));
        assert_eq!(recorder.calls.lock().len(), 2);
    }

    #[test]
    fn participant_added_splits_audience() {
        let (recorder, notifier) = notifier();
        notifier.participant_added(&users(&["alice", "bob", "dave"]), "dave", json!({"id": "42"}));

        let calls = recorder.calls.lock();
        assert_eq!(calls[0], (RoomId::user("dave"), EventKind::NewChat, json!({"id": "42"})));
        assert_eq!(calls.len(), 3);
        assert!(calls[1..]
            .iter()
            .all(|(_, k, p)| *k == EventKind::NewParticipantAdded && p["userId"] == "dave"));
    }

    #[test]
    fn participant_left_removes_chat_for_leaver() {
        let (recorder, notifier) = notifier();
        notifier.participant_left(&users(&["alice", "bob"]), "bob", json!({"id": "42"}));

        let calls = recorder.calls.lock();
        assert_eq!(calls[0].0, RoomId::user("bob"));
        assert_eq!(calls[0].1, EventKind::ChatDeleted);
        assert_eq!(calls[1].0, RoomId::user("alice"));
        assert_eq!(calls[1].1, EventKind::ParticipantLeft);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Direct messages: conversations and the events inside them.
//!
//! One-to-one conversations use the production id convention of the two
//! participant ids joined with a dash, lowest first, so that repeated
//! sends land in the same conversation without a lookup table.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::common::now_rfc3339;
use crate::error::{Error, ResourceError, Result};

use super::tweet::cmp_ids;
use super::Store;

/// One DM conversation.
#[derive(Clone, Debug)]
pub struct DmConversation {
    pub id: String,
    /// `"OneToOne"` or `"Group"`.
    pub conversation_type: String,
    pub participant_ids: BTreeSet<String>,
    pub created_at: String,
}

/// One event in a conversation; the fake only produces `MessageCreate`.
#[derive(Clone, Debug)]
pub struct DmEvent {
    pub id: String,
    pub event_type: String,
    pub text: String,
    pub sender_id: String,
    pub dm_conversation_id: String,
    pub created_at: String,
}

impl DmEvent {
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("event_type".into(), json!(self.event_type));
        map.insert("text".into(), json!(self.text));
        map.insert("sender_id".into(), json!(self.sender_id));
        map.insert("dm_conversation_id".into(), json!(self.dm_conversation_id));
        map.insert("created_at".into(), json!(self.created_at));
        map
    }
}

/// The production id convention for one-to-one conversations.
fn one_to_one_id(a: &str, b: &str) -> String {
    match cmp_ids(a, b) {
        std::cmp::Ordering::Greater => format!("{}-{}", b, a),
        _ => format!("{}-{}", a, b),
    }
}

impl Store {
    /// Sends a message to the one-to-one conversation with `participant`,
    /// creating the conversation on first contact.
    pub fn send_dm_to_participant(
        &self,
        sender: &str,
        participant: &str,
        text: &str,
    ) -> Result<DmEvent> {
        let event_id = self.next_id();
        let mut inner = self.write();
        if !inner.users.contains_key(sender) {
            return Err(Error::NotFound(ResourceError::new("user", sender, "id")));
        }
        if !inner.users.contains_key(participant) {
            return Err(Error::NotFound(ResourceError::new(
                "user",
                participant,
                "participant_id",
            )));
        }

        let conversation_id = one_to_one_id(sender, participant);
        inner
            .dm_conversations
            .entry(conversation_id.clone())
            .or_insert_with(|| {
                let mut participants = BTreeSet::new();
                participants.insert(sender.to_string());
                participants.insert(participant.to_string());
                DmConversation {
                    id: conversation_id.clone(),
                    conversation_type: "OneToOne".to_string(),
                    participant_ids: participants,
                    created_at: now_rfc3339(),
                }
            });

        let event = DmEvent {
            id: event_id,
            event_type: "MessageCreate".to_string(),
            text: text.to_string(),
            sender_id: sender.to_string(),
            dm_conversation_id: conversation_id,
            created_at: now_rfc3339(),
        };
        inner.dm_events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    /// Creates a group conversation with an opening message.
    pub fn create_group_conversation(
        &self,
        creator: &str,
        participant_ids: &[String],
        text: &str,
    ) -> Result<DmEvent> {
        let conversation_id = self.next_id();
        let event_id = self.next_id();
        let mut inner = self.write();
        if !inner.users.contains_key(creator) {
            return Err(Error::NotFound(ResourceError::new("user", creator, "id")));
        }
        for participant in participant_ids {
            if !inner.users.contains_key(participant) {
                return Err(Error::NotFound(ResourceError::new(
                    "user",
                    participant,
                    "participant_ids",
                )));
            }
        }

        let mut participants: BTreeSet<String> =
            participant_ids.iter().cloned().collect();
        participants.insert(creator.to_string());
        inner.dm_conversations.insert(
            conversation_id.clone(),
            DmConversation {
                id: conversation_id.clone(),
                conversation_type: "Group".to_string(),
                participant_ids: participants,
                created_at: now_rfc3339(),
            },
        );

        let event = DmEvent {
            id: event_id,
            event_type: "MessageCreate".to_string(),
            text: text.to_string(),
            sender_id: creator.to_string(),
            dm_conversation_id: conversation_id,
            created_at: now_rfc3339(),
        };
        inner.dm_events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    /// Sends into an existing conversation by id.
    pub fn send_dm_to_conversation(
        &self,
        sender: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<DmEvent> {
        let event_id = self.next_id();
        let mut inner = self.write();
        if !inner.dm_conversations.contains_key(conversation_id) {
            return Err(Error::NotFound(ResourceError::new(
                "dm_conversation",
                conversation_id,
                "dm_conversation_id",
            )));
        }
        let event = DmEvent {
            id: event_id,
            event_type: "MessageCreate".to_string(),
            text: text.to_string(),
            sender_id: sender.to_string(),
            dm_conversation_id: conversation_id.to_string(),
            created_at: now_rfc3339(),
        };
        inner.dm_events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    /// All events, newest-first.
    pub fn dm_events(&self) -> Vec<DmEvent> {
        let mut events: Vec<DmEvent> = self.read().dm_events.values().cloned().collect();
        events.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        events
    }

    /// Events of the one-to-one conversation between the two users,
    /// newest-first. An empty history is fine.
    pub fn dm_events_with(&self, a: &str, b: &str) -> Vec<DmEvent> {
        let conversation_id = one_to_one_id(a, b);
        let mut events: Vec<DmEvent> = self
            .read()
            .dm_events
            .values()
            .filter(|e| e.dm_conversation_id == conversation_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_contact_creates_the_conversation() {
        let store = Store::seeded();
        let event = store.send_dm_to_participant("0", "1", "hello robin").unwrap();
        assert_eq!(event.dm_conversation_id, "0-1");
        assert_eq!(event.event_type, "MessageCreate");

        // replies from the other side land in the same conversation
        let reply = store.send_dm_to_participant("1", "0", "hello back").unwrap();
        assert_eq!(reply.dm_conversation_id, "0-1");

        let events = store.dm_events_with("0", "1");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "hello back");
    }

    #[test]
    fn group_conversations_get_snowflake_ids() {
        let store = Store::seeded();
        let event = store
            .create_group_conversation("0", &["1".to_string(), "2".to_string()], "flock chat")
            .unwrap();
        assert!(crate::common::is_snowflake(&event.dm_conversation_id));

        let follow_up = store
            .send_dm_to_conversation("1", &event.dm_conversation_id, "present")
            .unwrap();
        assert_eq!(follow_up.dm_conversation_id, event.dm_conversation_id);
    }

    #[test]
    fn unknown_targets_are_not_found() {
        let store = Store::seeded();
        assert!(store.send_dm_to_participant("0", "99999", "hi").is_err());
        assert!(store.send_dm_to_conversation("0", "99999", "hi").is_err());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Filtered-stream rules: add, delete, list, and evaluation against
//! outgoing tweets.
//!
//! Rule evaluation supports the slice of the production query language the
//! fake needs: bare terms (all must appear, case-insensitive), quoted
//! phrases, and the `from:` operator. Anything else in a rule value is
//! treated as a plain term.

use serde_json::{json, Value};

use super::{Store, Tweet, User};

/// Caps reported by the rule-counts endpoint.
pub const CAP_PER_CLIENT_APP: u32 = 25;
pub const CAP_PER_PROJECT: u32 = 100;

/// One persisted filtered-stream rule.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRule {
    pub id: String,
    pub value: String,
    pub tag: Option<String>,
}

impl StreamRule {
    pub fn wire(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("value".into(), json!(self.value));
        if let Some(tag) = &self.tag {
            map.insert("tag".into(), json!(tag));
        }
        Value::Object(map)
    }

    /// Whether the rule matches a tweet by the given author.
    pub fn matches(&self, tweet: &Tweet, author: Option<&User>) -> bool {
        let haystack = tweet.text.to_lowercase();
        for token in tokenize(&self.value) {
            match token {
                Token::Term(term) => {
                    if !haystack.contains(&term) {
                        return false;
                    }
                }
                Token::From(handle) => {
                    let hit = author.map_or(false, |a| {
                        a.username.eq_ignore_ascii_case(&handle) || a.id == handle
                    });
                    if !hit {
                        return false;
                    }
                }
            }
        }
        true
    }
}

enum Token {
    Term(String),
    From(String),
}

fn tokenize(value: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = value.trim();
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('"') {
            // quoted phrase
            let end = stripped.find('"').unwrap_or(stripped.len());
            tokens.push(Token::Term(stripped[..end].to_lowercase()));
            rest = stripped[end..].trim_start_matches('"').trim_start();
            continue;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = &rest[..end];
        if let Some(handle) = word.strip_prefix("from:") {
            tokens.push(Token::From(handle.to_string()));
        } else if !word.is_empty() {
            tokens.push(Token::Term(word.to_lowercase()));
        }
        rest = rest[end..].trim_start();
    }
    tokens
}

/// The result of one add/delete batch, rendered into the rules `meta`.
#[derive(Clone, Debug, Default)]
pub struct RuleOutcome {
    pub created: Vec<StreamRule>,
    pub deleted: usize,
    pub not_deleted: usize,
    /// Per-entry errors (duplicate values), in the wire shape.
    pub errors: Vec<Value>,
    pub not_created: usize,
    pub invalid: usize,
}

impl RuleOutcome {
    pub fn summary(&self, deleting: bool) -> Value {
        if deleting {
            json!({
                "deleted": self.deleted,
                "not_deleted": self.not_deleted,
            })
        } else {
            json!({
                "created": self.created.len(),
                "not_created": self.not_created,
                "valid": self.created.len(),
                "invalid": self.invalid,
            })
        }
    }
}

impl Store {
    /// Adds a batch of rules. Duplicate values produce a per-entry
    /// `DuplicateRule` error while the rest of the batch still lands.
    pub fn add_stream_rules(&self, entries: &[(String, Option<String>)], dry_run: bool) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let mut inner = self.write();
        for (value, tag) in entries {
            if value.trim().is_empty() {
                outcome.invalid += 1;
                outcome.not_created += 1;
                outcome.errors.push(json!({
                    "value": value,
                    "title": "Invalid Rule",
                    "details": ["Rule value cannot be empty."],
                    "type": "https://api.twitter.com/2/problems/invalid-rules",
                }));
                continue;
            }
            if inner.rules.iter().any(|r| &r.value == value) {
                outcome.not_created += 1;
                outcome.errors.push(json!({
                    "value": value,
                    "id": inner.rules.iter().find(|r| &r.value == value).map(|r| r.id.clone()),
                    "title": "DuplicateRule",
                    "type": "https://api.twitter.com/2/problems/duplicate-rules",
                }));
                continue;
            }
            let rule = StreamRule {
                id: self.next_id(),
                value: value.clone(),
                tag: tag.clone(),
            };
            if !dry_run {
                inner.rules.push(rule.clone());
            }
            outcome.created.push(rule);
        }
        outcome
    }

    /// Deletes rules by id or value; absent targets count as not-deleted.
    pub fn delete_stream_rules(&self, ids: &[String], values: &[String]) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let mut inner = self.write();
        let before = inner.rules.len();
        inner
            .rules
            .retain(|r| !ids.contains(&r.id) && !values.contains(&r.value));
        outcome.deleted = before - inner.rules.len();
        outcome.not_deleted = (ids.len() + values.len()).saturating_sub(outcome.deleted);
        outcome
    }

    pub fn stream_rules(&self) -> Vec<StreamRule> {
        self.read().rules.clone()
    }

    /// The rule-counts report, in the exact production shape.
    pub fn rule_counts(&self, client_app_id: &str) -> Value {
        let count = self.read().rules.len();
        json!({
            "cap_per_client_app": CAP_PER_CLIENT_APP,
            "cap_per_project": CAP_PER_PROJECT,
            "client_app_rules_count": {
                "client_app_id": client_app_id,
                "rule_count": count,
            },
            "project_rules_count": count,
        })
    }

    /// Whether any active rule matches the tweet. With no rules at all the
    /// filtered stream emits nothing.
    pub fn any_rule_matches(&self, tweet: &Tweet) -> bool {
        let inner = self.read();
        let author = inner.users.get(&tweet.author_id);
        inner.rules.iter().any(|r| r.matches(tweet, author))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TweetDraft;

    fn entry(value: &str) -> (String, Option<String>) {
        (value.to_string(), None)
    }

    #[test]
    fn duplicates_error_without_blocking_the_batch() {
        let store = Store::seeded();
        let first = store.add_stream_rules(&[entry("birdsong")], false);
        assert_eq!(first.created.len(), 1);
        assert!(first.errors.is_empty());

        let second = store.add_stream_rules(
            &[entry("birdsong"), entry("migration")],
            false,
        );
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.not_created, 1);
        assert_eq!(second.errors[0]["title"], "DuplicateRule");
        assert_eq!(store.stream_rules().len(), 2);

        let summary = second.summary(false);
        assert_eq!(summary["created"], 1);
        assert_eq!(summary["not_created"], 1);
        assert_eq!(summary["valid"], 1);
        assert_eq!(summary["invalid"], 0);
    }

    #[test]
    fn dry_run_validates_without_creating() {
        let store = Store::seeded();
        let outcome = store.add_stream_rules(&[entry("test rule")], true);
        assert_eq!(outcome.created.len(), 1);
        assert!(store.stream_rules().is_empty());
    }

    #[test]
    fn delete_by_id_and_value() {
        let store = Store::seeded();
        let added = store.add_stream_rules(&[entry("one"), entry("two")], false);
        let id = added.created[0].id.clone();

        let outcome =
            store.delete_stream_rules(&[id], &["two".to_string(), "ghost".to_string()]);
        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.not_deleted, 1);
        assert!(store.stream_rules().is_empty());
    }

    #[test]
    fn rule_matching_supports_terms_phrases_and_from() {
        let store = Store::seeded();
        let tweet = store
            .create_tweet(TweetDraft::new("Dawn chorus report from the hedge"), "1")
            .unwrap();
        let author = store.get_user("1");

        let yes = StreamRule {
            id: "1".into(),
            value: "dawn chorus".into(),
            tag: None,
        };
        assert!(yes.matches(&tweet, author.as_ref()));

        let phrase = StreamRule {
            id: "2".into(),
            value: "\"chorus report\"".into(),
            tag: None,
        };
        assert!(phrase.matches(&tweet, author.as_ref()));

        let wrong_author = StreamRule {
            id: "3".into(),
            value: "chorus from:wren".into(),
            tag: None,
        };
        assert!(!wrong_author.matches(&tweet, author.as_ref()));

        let right_author = StreamRule {
            id: "4".into(),
            value: "chorus from:robin".into(),
            tag: None,
        };
        assert!(right_author.matches(&tweet, author.as_ref()));
    }

    #[test]
    fn counts_shape_is_production_compatible() {
        let store = Store::seeded();
        store.add_stream_rules(&[entry("anything")], false);
        let counts = store.rule_counts("27");
        assert_eq!(counts["cap_per_client_app"], 25);
        assert_eq!(counts["client_app_rules_count"]["client_app_id"], "27");
        assert_eq!(counts["client_app_rules_count"]["rule_count"], 1);
        assert_eq!(counts["project_rules_count"], 1);
    }
}

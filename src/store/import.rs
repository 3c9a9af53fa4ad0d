// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! State export and import: a JSON object keyed by entity type, capped and
//! format-checked before a single entity lands in the store.
//!
//! Import rebuilds the mirror sets from the forward edges rather than
//! trusting the file, so a hand-edited export cannot desynchronize the
//! graph invariants.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::common::{is_snowflake, now_rfc3339, USERNAME_RE};
use crate::error::{Error, Result};

use super::{Store, Tweet, User};

/// Import caps, per entity collection and overall.
pub const MAX_USERS: usize = 10_000;
pub const MAX_TWEETS: usize = 100_000;
pub const MAX_LISTS: usize = 1_000;
pub const MAX_TOTAL: usize = 200_000;

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(|v| v.as_str())
}

impl Store {
    /// Serializes the mutable state: users, tweets, and lists with their
    /// forward edges. Mirrors are derivable and deliberately left out.
    pub fn export_state(&self) -> Value {
        let inner = self.read();
        let users: Vec<Value> = inner
            .users
            .values()
            .map(|u| {
                json!({
                    "id": u.id,
                    "username": u.username,
                    "name": u.name,
                    "description": u.description,
                    "created_at": u.created_at,
                    "pinned_tweet_id": u.pinned_tweet_id,
                    "following": u.following,
                    "blocked": u.blocked,
                    "muted": u.muted,
                    "liked_tweets": u.liked_tweets,
                    "retweeted_tweets": u.retweeted_tweets,
                    "bookmarked_tweets": u.bookmarked_tweets,
                })
            })
            .collect();
        let tweets: Vec<Value> = inner
            .tweets
            .values()
            .map(|t| {
                json!({
                    "id": t.id,
                    "author_id": t.author_id,
                    "text": t.text,
                    "created_at": t.created_at.to_rfc3339(),
                    "in_reply_to_tweet_id": t
                        .referenced_tweets
                        .iter()
                        .find(|r| r.ref_type == super::RefType::RepliedTo)
                        .map(|r| r.id.clone()),
                    "quote_tweet_id": t
                        .referenced_tweets
                        .iter()
                        .find(|r| r.ref_type == super::RefType::Quoted)
                        .map(|r| r.id.clone()),
                })
            })
            .collect();
        let lists: Vec<Value> = inner
            .lists
            .values()
            .map(|l| {
                json!({
                    "id": l.id,
                    "name": l.name,
                    "description": l.description,
                    "private": l.private,
                    "owner_id": l.owner_id,
                    "members": l.members,
                })
            })
            .collect();
        json!({
            "users": users,
            "tweets": tweets,
            "lists": lists,
        })
    }

    /// Checks an import document against the caps and the id/username
    /// formats, without touching the store.
    pub fn validate_state_import(state: &Value) -> Result<()> {
        let section = |name: &str| -> &[Value] {
            state
                .get(name)
                .and_then(|v| v.as_array())
                .map(|v| v.as_slice())
                .unwrap_or(&[])
        };
        let users = section("users");
        let tweets = section("tweets");
        let lists = section("lists");

        let mut batch = crate::error::ValidationErrors::default();
        let mut reject = |name: &str, value: &str, message: String| {
            batch.push(crate::error::ValidationError::new(
                name,
                vec![value.to_string()],
                message,
            ));
        };

        if users.len() > MAX_USERS {
            reject("users", &users.len().to_string(), format!("Import may contain at most {} users", MAX_USERS));
        }
        if tweets.len() > MAX_TWEETS {
            reject("tweets", &tweets.len().to_string(), format!("Import may contain at most {} tweets", MAX_TWEETS));
        }
        if lists.len() > MAX_LISTS {
            reject("lists", &lists.len().to_string(), format!("Import may contain at most {} lists", MAX_LISTS));
        }
        let total = users.len() + tweets.len() + lists.len();
        if total > MAX_TOTAL {
            reject("total", &total.to_string(), format!("Import may contain at most {} entities", MAX_TOTAL));
        }

        for user in users {
            let id = field(user, "id").unwrap_or("");
            if !is_snowflake(id) {
                reject("users.id", id, format!("The user id [{}] is not a valid id", id));
            }
            let username = field(user, "username").unwrap_or("");
            if !USERNAME_RE.is_match(username) {
                reject(
                    "users.username",
                    username,
                    format!("The username [{}] is not a valid handle", username),
                );
            }
        }
        for tweet in tweets {
            let id = field(tweet, "id").unwrap_or("");
            if !is_snowflake(id) {
                reject("tweets.id", id, format!("The tweet id [{}] is not a valid id", id));
            }
        }
        for list in lists {
            let id = field(list, "id").unwrap_or("");
            if !is_snowflake(id) {
                reject("lists.id", id, format!("The list id [{}] is not a valid id", id));
            }
        }

        if batch.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(batch))
        }
    }

    /// Replaces the mutable state with the import, rebuilding every mirror
    /// from the forward edges. The default user is re-created if the
    /// import lacks one.
    pub fn import_state(&self, state: &Value) -> Result<(usize, usize, usize)> {
        Self::validate_state_import(state)?;

        let empty = Vec::new();
        let section = |name: &str| -> &Vec<Value> {
            state
                .get(name)
                .and_then(|v| v.as_array())
                .unwrap_or(&empty)
        };

        let mut inner = self.write();
        inner.users.clear();
        inner.tweets.clear();
        inner.lists.clear();

        for raw in section("users") {
            let id = field(raw, "id").unwrap_or_default().to_string();
            let mut user = User::new(
                id.clone(),
                field(raw, "username").unwrap_or_default(),
                field(raw, "name").unwrap_or_default(),
            );
            user.description = field(raw, "description").unwrap_or_default().to_string();
            if let Some(created) = field(raw, "created_at") {
                user.created_at = created.to_string();
            }
            user.pinned_tweet_id = field(raw, "pinned_tweet_id").map(String::from);
            user.following = string_set(raw.get("following"));
            user.blocked = string_set(raw.get("blocked"));
            user.muted = string_set(raw.get("muted"));
            user.liked_tweets = string_set(raw.get("liked_tweets"));
            user.retweeted_tweets = string_set(raw.get("retweeted_tweets"));
            user.bookmarked_tweets = string_set(raw.get("bookmarked_tweets"));
            inner.users.insert(id, user);
        }

        for raw in section("tweets") {
            let id = field(raw, "id").unwrap_or_default().to_string();
            let author_id = field(raw, "author_id").unwrap_or_default().to_string();
            let created_at = field(raw, "created_at")
                .and_then(|c| chrono::DateTime::parse_from_rfc3339(c).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(chrono::Utc::now);
            let mut referenced = Vec::new();
            if let Some(parent) = field(raw, "in_reply_to_tweet_id") {
                referenced.push(super::TweetReference {
                    ref_type: super::RefType::RepliedTo,
                    id: parent.to_string(),
                });
            }
            if let Some(quoted) = field(raw, "quote_tweet_id") {
                referenced.push(super::TweetReference {
                    ref_type: super::RefType::Quoted,
                    id: quoted.to_string(),
                });
            }
            let tweet = Tweet {
                id: id.clone(),
                author_id,
                text: field(raw, "text").unwrap_or_default().to_string(),
                created_at,
                edit_history_tweet_ids: vec![id.clone()],
                conversation_id: id.clone(),
                in_reply_to_user_id: None,
                referenced_tweets: referenced,
                attachments_media_keys: Vec::new(),
                attachments_poll_ids: Vec::new(),
                lang: "en".to_string(),
                source: "import".to_string(),
                reply_settings: "everyone".to_string(),
                possibly_sensitive: false,
                liked_by: BTreeSet::new(),
                retweeted_by: BTreeSet::new(),
                bookmarked_by: BTreeSet::new(),
                replies: BTreeSet::new(),
                quotes: BTreeSet::new(),
            };
            inner.tweets.insert(id, tweet);
        }

        for raw in section("lists") {
            let id = field(raw, "id").unwrap_or_default().to_string();
            let list = super::List {
                id: id.clone(),
                name: field(raw, "name").unwrap_or_default().to_string(),
                description: field(raw, "description").unwrap_or_default().to_string(),
                private: raw.get("private").and_then(|p| p.as_bool()).unwrap_or(false),
                owner_id: field(raw, "owner_id").unwrap_or_default().to_string(),
                created_at: now_rfc3339(),
                members: string_set(raw.get("members")),
                followers: BTreeSet::new(),
            };
            inner.lists.insert(id, list);
        }

        // rebuild every mirror from the forward edges
        let user_ids: Vec<String> = inner.users.keys().cloned().collect();
        for id in &user_ids {
            let (following, liked, retweeted, bookmarked) = {
                let user = &inner.users[id];
                (
                    user.following.clone(),
                    user.liked_tweets.clone(),
                    user.retweeted_tweets.clone(),
                    user.bookmarked_tweets.clone(),
                )
            };
            for target in following {
                if let Some(target) = inner.users.get_mut(&target) {
                    target.followers.insert(id.clone());
                }
            }
            for tweet in liked {
                if let Some(tweet) = inner.tweets.get_mut(&tweet) {
                    tweet.liked_by.insert(id.clone());
                }
            }
            for tweet in retweeted {
                if let Some(tweet) = inner.tweets.get_mut(&tweet) {
                    tweet.retweeted_by.insert(id.clone());
                }
            }
            for tweet in bookmarked {
                if let Some(tweet) = inner.tweets.get_mut(&tweet) {
                    tweet.bookmarked_by.insert(id.clone());
                }
            }
        }
        let tweet_rows: Vec<(String, String, Vec<super::TweetReference>)> = inner
            .tweets
            .values()
            .map(|t| (t.id.clone(), t.author_id.clone(), t.referenced_tweets.clone()))
            .collect();
        for (id, author, referenced) in tweet_rows {
            if let Some(author) = inner.users.get_mut(&author) {
                author.tweets.insert(id.clone());
            }
            for reference in referenced {
                if let Some(parent) = inner.tweets.get_mut(&reference.id) {
                    match reference.ref_type {
                        super::RefType::RepliedTo => {
                            parent.replies.insert(id.clone());
                        }
                        super::RefType::Quoted => {
                            parent.quotes.insert(id.clone());
                        }
                        super::RefType::Retweeted => {}
                    }
                }
            }
        }
        let list_rows: Vec<(String, String, BTreeSet<String>)> = inner
            .lists
            .values()
            .map(|l| (l.id.clone(), l.owner_id.clone(), l.members.clone()))
            .collect();
        for (id, owner, members) in list_rows {
            if let Some(owner) = inner.users.get_mut(&owner) {
                owner.owned_lists.insert(id.clone());
            }
            for member in members {
                if let Some(member) = inner.users.get_mut(&member) {
                    member.member_of_lists.insert(id.clone());
                }
            }
        }

        if !inner.users.contains_key("0") {
            inner
                .users
                .insert("0".to_string(), User::new("0".to_string(), "mockingbird", "Mockingbird Dev"));
        }

        Ok((
            inner.users.len(),
            inner.tweets.len(),
            inner.lists.len(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TweetDraft;

    #[test]
    fn export_then_import_rebuilds_mirrors() {
        let store = Store::seeded();
        store.follow_user("1", "2").unwrap();
        let tweet = store.create_tweet(TweetDraft::new("export me"), "1").unwrap();
        store.like_tweet("2", &tweet.id).unwrap();

        let state = store.export_state();

        let fresh = Store::new();
        fresh.import_state(&state).unwrap();

        let two = fresh.get_user("2").unwrap();
        assert!(two.liked_tweets.contains(&tweet.id));
        assert!(fresh.get_user("1").unwrap().following.contains("2"));
        assert!(fresh.get_user("2").unwrap().followers.contains("1"));
        assert!(fresh
            .get_tweet(&tweet.id)
            .unwrap()
            .liked_by
            .contains("2"));
    }

    #[test]
    fn caps_are_enforced() {
        let users: Vec<Value> = (0..11_000)
            .map(|i| json!({"id": i.to_string(), "username": format!("u{}", i), "name": "x"}))
            .collect();
        let state = json!({ "users": users });
        match Store::validate_state_import(&state) {
            Err(Error::Validation(batch)) => {
                assert!(batch.errors.iter().any(|e| e.message.contains("10000")));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn bad_formats_are_rejected() {
        let state = json!({
            "users": [{"id": "not-numeric", "username": "way_too_long_for_a_handle", "name": "x"}],
        });
        match Store::validate_state_import(&state) {
            Err(Error::Validation(batch)) => assert_eq!(batch.errors.len(), 2),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn import_restores_the_default_user() {
        let store = Store::new();
        store
            .import_state(&json!({
                "users": [{"id": "5", "username": "someone", "name": "Some One"}],
            }))
            .unwrap();
        assert!(store.get_user("0").is_some());
        assert!(store.get_user("5").is_some());
    }
}

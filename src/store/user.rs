// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Users and the relationship graph: follows, blocks, mutes, and the
//! back-indices that make timeline and search reads cheap.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::common::{now_rfc3339, Cancel, USERNAME_RE};
use crate::error::{Error, ResourceError, Result};

use super::Store;

/// How often long user scans poll the cancellation token.
const SCAN_STRIDE: usize = 100;

/// One account. Relationship edges are id sets, mirrored on both ends.
#[derive(Clone, Debug, Default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub protected: bool,
    pub verified: bool,
    pub location: Option<String>,
    pub url: Option<String>,
    pub pinned_tweet_id: Option<String>,
    /// Accounts this user follows.
    pub following: BTreeSet<String>,
    /// Accounts following this user. Mirror of `following`.
    pub followers: BTreeSet<String>,
    pub blocked: BTreeSet<String>,
    pub muted: BTreeSet<String>,
    /// Back-indices maintained by tweet/list mutations.
    pub tweets: BTreeSet<String>,
    pub liked_tweets: BTreeSet<String>,
    pub retweeted_tweets: BTreeSet<String>,
    pub bookmarked_tweets: BTreeSet<String>,
    pub owned_lists: BTreeSet<String>,
    pub pinned_lists: BTreeSet<String>,
    pub followed_lists: BTreeSet<String>,
    pub member_of_lists: BTreeSet<String>,
}

impl User {
    pub fn new(id: String, username: &str, name: &str) -> User {
        User {
            id,
            username: username.to_string(),
            name: name.to_string(),
            created_at: now_rfc3339(),
            ..User::default()
        }
    }

    /// The full wire map; the response shaper trims it to the requested
    /// field selection.
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("name".into(), json!(self.name));
        map.insert("username".into(), json!(self.username));
        map.insert("created_at".into(), json!(self.created_at));
        map.insert("description".into(), json!(self.description));
        map.insert("protected".into(), json!(self.protected));
        map.insert("verified".into(), json!(self.verified));
        if let Some(location) = &self.location {
            map.insert("location".into(), json!(location));
        }
        if let Some(url) = &self.url {
            map.insert("url".into(), json!(url));
        }
        if let Some(pinned) = &self.pinned_tweet_id {
            map.insert("pinned_tweet_id".into(), json!(pinned));
        }
        map.insert(
            "public_metrics".into(),
            json!({
                "followers_count": self.followers.len(),
                "following_count": self.following.len(),
                "tweet_count": self.tweets.len(),
                "listed_count": self.member_of_lists.len(),
                "like_count": self.liked_tweets.len(),
            }),
        );
        map
    }
}

impl Store {
    /// Creates a user with a caller-chosen id; seeding and state import
    /// need fixed ids.
    pub fn create_user_with_id(&self, id: &str, username: &str, name: &str) -> Result<User> {
        if !USERNAME_RE.is_match(username) {
            return Err(Error::Internal(format!(
                "seed username {:?} is not a valid handle",
                username
            )));
        }
        let mut inner = self.write();
        if let Some(existing) = inner.users.get(id) {
            // idempotent: re-creating the same account is a no-op
            return Ok(existing.clone());
        }
        if inner.users.values().any(|u| u.username == username) {
            return Err(Error::Internal(format!(
                "username {:?} is already taken",
                username
            )));
        }
        let user = User::new(id.to_string(), username, name);
        inner.users.insert(id.to_string(), user.clone());
        Ok(user)
    }

    /// Creates a user under a fresh snowflake id.
    pub fn create_user(&self, username: &str, name: &str) -> Result<User> {
        let id = self.next_id();
        self.create_user_with_id(&id, username, name)
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.read().users.get(id).cloned()
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.read()
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned()
    }

    /// Bulk id lookup, preserving request order. The second return is the
    /// ids that missed, for the partial-error envelope.
    pub fn get_users(&self, ids: &[String]) -> (Vec<User>, Vec<String>) {
        let inner = self.read();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match inner.users.get(id) {
                Some(user) => found.push(user.clone()),
                None => missing.push(id.clone()),
            }
        }
        (found, missing)
    }

    /// Bulk username lookup, preserving request order.
    pub fn get_users_by_usernames(&self, usernames: &[String]) -> (Vec<User>, Vec<String>) {
        let inner = self.read();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for username in usernames {
            match inner
                .users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(username))
            {
                Some(user) => found.push(user.clone()),
                None => missing.push(username.clone()),
            }
        }
        (found, missing)
    }

    /// Case-insensitive substring search over username, name, and bio.
    pub fn search_users(&self, cancel: &Cancel, query: &str, limit: usize) -> Vec<User> {
        let needle = query.to_lowercase();
        let inner = self.read();
        let mut hits = Vec::new();
        for (i, user) in inner.users.values().enumerate() {
            if i % SCAN_STRIDE == 0 && cancel.cancelled() {
                break;
            }
            if user.username.to_lowercase().contains(&needle)
                || user.name.to_lowercase().contains(&needle)
                || user.description.to_lowercase().contains(&needle)
            {
                hits.push(user.clone());
                if hits.len() >= limit {
                    break;
                }
            }
        }
        hits
    }

    /// `source` follows `target`. Idempotent; both mirrors updated.
    pub fn follow_user(&self, source: &str, target: &str) -> Result<()> {
        self.link_users(source, target, |u| &mut u.following, |u| &mut u.followers)
    }

    pub fn unfollow_user(&self, source: &str, target: &str) -> Result<()> {
        self.unlink_users(source, target, |u| &mut u.following, |u| &mut u.followers)
    }

    /// `source` blocks `target`. Blocks have no reverse set on the wire,
    /// so only the forward edge exists.
    pub fn block_user(&self, source: &str, target: &str) -> Result<()> {
        self.touch_edge(source, target, |u, t| {
            u.blocked.insert(t);
        })
    }

    pub fn unblock_user(&self, source: &str, target: &str) -> Result<()> {
        self.touch_edge(source, target, |u, t| {
            u.blocked.remove(&t);
        })
    }

    pub fn mute_user(&self, source: &str, target: &str) -> Result<()> {
        self.touch_edge(source, target, |u, t| {
            u.muted.insert(t);
        })
    }

    pub fn unmute_user(&self, source: &str, target: &str) -> Result<()> {
        self.touch_edge(source, target, |u, t| {
            u.muted.remove(&t);
        })
    }

    /// The accounts `id` follows, resolved to user copies.
    pub fn following_of(&self, id: &str) -> Result<Vec<User>> {
        self.resolve_user_set(id, |u| u.following.clone())
    }

    pub fn followers_of(&self, id: &str) -> Result<Vec<User>> {
        self.resolve_user_set(id, |u| u.followers.clone())
    }

    pub fn blocking_of(&self, id: &str) -> Result<Vec<User>> {
        self.resolve_user_set(id, |u| u.blocked.clone())
    }

    pub fn muting_of(&self, id: &str) -> Result<Vec<User>> {
        self.resolve_user_set(id, |u| u.muted.clone())
    }

    fn resolve_user_set(
        &self,
        id: &str,
        pick: impl Fn(&User) -> BTreeSet<String>,
    ) -> Result<Vec<User>> {
        let inner = self.read();
        let user = inner
            .users
            .get(id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", id, "id")))?;
        Ok(pick(user)
            .iter()
            .filter_map(|other| inner.users.get(other).cloned())
            .collect())
    }

    fn link_users(
        &self,
        source: &str,
        target: &str,
        forward: impl Fn(&mut User) -> &mut BTreeSet<String>,
        mirror: impl Fn(&mut User) -> &mut BTreeSet<String>,
    ) -> Result<()> {
        let mut inner = self.write();
        if !inner.users.contains_key(source) {
            return Err(Error::NotFound(ResourceError::new("user", source, "id")));
        }
        if !inner.users.contains_key(target) {
            return Err(Error::NotFound(ResourceError::new(
                "user",
                target,
                "target_user_id",
            )));
        }
        forward(inner.users.get_mut(source).unwrap()).insert(target.to_string());
        mirror(inner.users.get_mut(target).unwrap()).insert(source.to_string());
        Ok(())
    }

    fn unlink_users(
        &self,
        source: &str,
        target: &str,
        forward: impl Fn(&mut User) -> &mut BTreeSet<String>,
        mirror: impl Fn(&mut User) -> &mut BTreeSet<String>,
    ) -> Result<()> {
        let mut inner = self.write();
        if !inner.users.contains_key(source) {
            return Err(Error::NotFound(ResourceError::new("user", source, "id")));
        }
        if let Some(user) = inner.users.get_mut(source) {
            forward(user).remove(target);
        }
        if let Some(user) = inner.users.get_mut(target) {
            mirror(user).remove(source);
        }
        Ok(())
    }

    fn touch_edge(
        &self,
        source: &str,
        target: &str,
        apply: impl Fn(&mut User, String),
    ) -> Result<()> {
        let mut inner = self.write();
        if !inner.users.contains_key(target) {
            return Err(Error::NotFound(ResourceError::new(
                "user",
                target,
                "target_user_id",
            )));
        }
        let user = inner
            .users
            .get_mut(source)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", source, "id")))?;
        apply(user, target.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_maintains_both_mirrors() {
        let store = Store::seeded();
        store.follow_user("0", "1").unwrap();

        let zero = store.get_user("0").unwrap();
        let one = store.get_user("1").unwrap();
        assert!(zero.following.contains("1"));
        assert!(one.followers.contains("0"));

        store.unfollow_user("0", "1").unwrap();
        let zero = store.get_user("0").unwrap();
        let one = store.get_user("1").unwrap();
        assert!(!zero.following.contains("1"));
        assert!(!one.followers.contains("0"));
    }

    #[test]
    fn follow_twice_is_one_edge() {
        let store = Store::seeded();
        store.follow_user("0", "1").unwrap();
        store.follow_user("0", "1").unwrap();
        assert_eq!(store.following_of("0").unwrap().len(), 1);
    }

    #[test]
    fn unfollow_of_a_stranger_is_fine() {
        let store = Store::seeded();
        store.unfollow_user("0", "3").unwrap();
        assert!(store.following_of("0").unwrap().is_empty());
    }

    #[test]
    fn follow_unknown_target_is_not_found() {
        let store = Store::seeded();
        match store.follow_user("0", "99999") {
            Err(Error::NotFound(resource)) => {
                assert_eq!(resource.resource_type, "user");
                assert_eq!(resource.resource_id, "99999");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn blocks_and_mutes_are_forward_only() {
        let store = Store::seeded();
        store.block_user("0", "2").unwrap();
        store.mute_user("0", "2").unwrap();

        assert_eq!(store.blocking_of("0").unwrap()[0].id, "2");
        assert_eq!(store.muting_of("0").unwrap()[0].id, "2");
        // no mirror on the target
        let two = store.get_user("2").unwrap();
        assert!(two.blocked.is_empty());

        store.unblock_user("0", "2").unwrap();
        store.unmute_user("0", "2").unwrap();
        assert!(store.blocking_of("0").unwrap().is_empty());
        assert!(store.muting_of("0").unwrap().is_empty());
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let store = Store::seeded();
        assert_eq!(store.get_user_by_username("ROBIN").unwrap().id, "1");
        assert!(store.get_user_by_username("cuckoo").is_none());
    }

    #[test]
    fn bulk_lookup_reports_misses() {
        let store = Store::seeded();
        let (found, missing) =
            store.get_users(&["1".to_string(), "404404".to_string(), "2".to_string()]);
        assert_eq!(found.len(), 2);
        assert_eq!(missing, vec!["404404".to_string()]);
    }

    #[test]
    fn search_matches_name_and_bio() {
        let store = Store::seeded();
        let hits = store.search_users(&Cancel::never(), "wren", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "wren");
    }

    #[test]
    fn cancelled_search_returns_partial() {
        let store = Store::seeded();
        let cancel = Cancel::new();
        cancel.cancel();
        assert!(store.search_users(&cancel, "e", 10).is_empty());
    }

    #[test]
    fn wire_map_has_defaults_and_metrics() {
        let store = Store::seeded();
        store.follow_user("1", "2").unwrap();
        let map = store.get_user("2").unwrap().wire();
        assert_eq!(map["id"], "2");
        assert_eq!(map["username"], "wren");
        assert_eq!(map["public_metrics"]["followers_count"], 1);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lists: ownership, membership, pinning, and following. All the list
//! management endpoints enforce the owner rule with the fixed 403 detail.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::common::now_rfc3339;
use crate::error::{Error, ResourceError, Result};

use super::tweet::cmp_ids;
use super::{Store, Tweet, User};

/// One list. `members` and `followers` are mirrored into the users'
/// `member_of_lists` / `followed_lists` back-indices.
#[derive(Clone, Debug)]
pub struct List {
    pub id: String,
    pub name: String,
    pub description: String,
    pub private: bool,
    pub owner_id: String,
    pub created_at: String,
    pub members: BTreeSet<String>,
    pub followers: BTreeSet<String>,
}

impl List {
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("name".into(), json!(self.name));
        map.insert("created_at".into(), json!(self.created_at));
        map.insert("description".into(), json!(self.description));
        map.insert("owner_id".into(), json!(self.owner_id));
        map.insert("private".into(), json!(self.private));
        map.insert("member_count".into(), json!(self.members.len()));
        map.insert("follower_count".into(), json!(self.followers.len()));
        map
    }
}

impl Store {
    pub fn create_list(
        &self,
        owner_id: &str,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<List> {
        let id = self.next_id();
        let mut inner = self.write();
        if !inner.users.contains_key(owner_id) {
            return Err(Error::NotFound(ResourceError::new("user", owner_id, "id")));
        }
        let list = List {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            private,
            owner_id: owner_id.to_string(),
            created_at: now_rfc3339(),
            members: BTreeSet::new(),
            followers: BTreeSet::new(),
        };
        inner
            .users
            .get_mut(owner_id)
            .unwrap()
            .owned_lists
            .insert(id.clone());
        inner.lists.insert(id, list.clone());
        Ok(list)
    }

    pub fn get_list(&self, id: &str) -> Option<List> {
        self.read().lists.get(id).cloned()
    }

    /// Updates name/description/privacy. Only the owner may.
    pub fn update_list(
        &self,
        id: &str,
        actor: &str,
        name: Option<&str>,
        description: Option<&str>,
        private: Option<bool>,
    ) -> Result<List> {
        let mut inner = self.write();
        let list = inner
            .lists
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("list", id, "id")))?;
        if list.owner_id != actor {
            return Err(Error::not_list_owner());
        }
        if let Some(name) = name {
            list.name = name.to_string();
        }
        if let Some(description) = description {
            list.description = description.to_string();
        }
        if let Some(private) = private {
            list.private = private;
        }
        Ok(list.clone())
    }

    /// Deletes a list. `Ok(false)` when it never existed; 403 for
    /// non-owners.
    pub fn delete_list(&self, id: &str, actor: &str) -> Result<bool> {
        let mut inner = self.write();
        let list = match inner.lists.get(id) {
            Some(list) => list.clone(),
            None => return Ok(false),
        };
        if list.owner_id != actor {
            return Err(Error::not_list_owner());
        }
        inner.lists.remove(id);
        for user in inner.users.values_mut() {
            user.owned_lists.remove(id);
            user.pinned_lists.remove(id);
            user.followed_lists.remove(id);
            user.member_of_lists.remove(id);
        }
        Ok(true)
    }

    /// Adds a member. Only the owner may manage membership.
    pub fn add_list_member(&self, list_id: &str, actor: &str, user_id: &str) -> Result<()> {
        let mut inner = self.write();
        let list = inner
            .lists
            .get_mut(list_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("list", list_id, "id")))?;
        if list.owner_id != actor {
            return Err(Error::not_list_owner());
        }
        if !inner.users.contains_key(user_id) {
            return Err(Error::NotFound(ResourceError::new("user", user_id, "user_id")));
        }
        inner
            .lists
            .get_mut(list_id)
            .unwrap()
            .members
            .insert(user_id.to_string());
        inner
            .users
            .get_mut(user_id)
            .unwrap()
            .member_of_lists
            .insert(list_id.to_string());
        Ok(())
    }

    /// Removes a member; removing an absent member still succeeds.
    pub fn remove_list_member(&self, list_id: &str, actor: &str, user_id: &str) -> Result<()> {
        let mut inner = self.write();
        let list = inner
            .lists
            .get_mut(list_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("list", list_id, "id")))?;
        if list.owner_id != actor {
            return Err(Error::not_list_owner());
        }
        list.members.remove(user_id);
        if let Some(user) = inner.users.get_mut(user_id) {
            user.member_of_lists.remove(list_id);
        }
        Ok(())
    }

    pub fn list_members(&self, list_id: &str) -> Result<Vec<User>> {
        let inner = self.read();
        let list = inner
            .lists
            .get(list_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("list", list_id, "id")))?;
        Ok(list
            .members
            .iter()
            .filter_map(|id| inner.users.get(id).cloned())
            .collect())
    }

    pub fn list_followers(&self, list_id: &str) -> Result<Vec<User>> {
        let inner = self.read();
        let list = inner
            .lists
            .get(list_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("list", list_id, "id")))?;
        Ok(list
            .followers
            .iter()
            .filter_map(|id| inner.users.get(id).cloned())
            .collect())
    }

    /// Tweets authored by the list's members, newest-first.
    pub fn list_tweets(&self, list_id: &str) -> Result<Vec<Tweet>> {
        let inner = self.read();
        let list = inner
            .lists
            .get(list_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("list", list_id, "id")))?;
        let mut tweets: Vec<Tweet> = inner
            .tweets
            .values()
            .filter(|t| list.members.contains(&t.author_id))
            .cloned()
            .collect();
        tweets.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        Ok(tweets)
    }

    pub fn pin_list(&self, user_id: &str, list_id: &str) -> Result<()> {
        self.touch_list_edge(user_id, list_id, |user, list_id| {
            user.pinned_lists.insert(list_id);
        })
    }

    pub fn unpin_list(&self, user_id: &str, list_id: &str) -> Result<()> {
        self.touch_list_edge(user_id, list_id, |user, list_id| {
            user.pinned_lists.remove(&list_id);
        })
    }

    pub fn follow_list(&self, user_id: &str, list_id: &str) -> Result<()> {
        let mut inner = self.write();
        if !inner.lists.contains_key(list_id) {
            return Err(Error::NotFound(ResourceError::new("list", list_id, "list_id")));
        }
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", user_id, "id")))?;
        user.followed_lists.insert(list_id.to_string());
        inner
            .lists
            .get_mut(list_id)
            .unwrap()
            .followers
            .insert(user_id.to_string());
        Ok(())
    }

    pub fn unfollow_list(&self, user_id: &str, list_id: &str) -> Result<()> {
        let mut inner = self.write();
        if let Some(user) = inner.users.get_mut(user_id) {
            user.followed_lists.remove(list_id);
        } else {
            return Err(Error::NotFound(ResourceError::new("user", user_id, "id")));
        }
        if let Some(list) = inner.lists.get_mut(list_id) {
            list.followers.remove(user_id);
        }
        Ok(())
    }

    fn touch_list_edge(
        &self,
        user_id: &str,
        list_id: &str,
        apply: impl Fn(&mut User, String),
    ) -> Result<()> {
        let mut inner = self.write();
        if !inner.lists.contains_key(list_id) {
            return Err(Error::NotFound(ResourceError::new("list", list_id, "list_id")));
        }
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", user_id, "id")))?;
        apply(user, list_id.to_string());
        Ok(())
    }

    pub fn owned_lists_of(&self, user_id: &str) -> Result<Vec<List>> {
        self.resolve_list_set(user_id, |u| u.owned_lists.clone())
    }

    pub fn pinned_lists_of(&self, user_id: &str) -> Result<Vec<List>> {
        self.resolve_list_set(user_id, |u| u.pinned_lists.clone())
    }

    pub fn followed_lists_of(&self, user_id: &str) -> Result<Vec<List>> {
        self.resolve_list_set(user_id, |u| u.followed_lists.clone())
    }

    pub fn list_memberships_of(&self, user_id: &str) -> Result<Vec<List>> {
        self.resolve_list_set(user_id, |u| u.member_of_lists.clone())
    }

    fn resolve_list_set(
        &self,
        user_id: &str,
        pick: impl Fn(&User) -> BTreeSet<String>,
    ) -> Result<Vec<List>> {
        let inner = self.read();
        let user = inner
            .users
            .get(user_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", user_id, "id")))?;
        Ok(pick(user)
            .iter()
            .filter_map(|id| inner.lists.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TweetDraft;

    #[test]
    fn create_update_delete_respect_ownership() {
        let store = Store::seeded();
        let list = store.create_list("1", "Songbirds", "the good ones", false).unwrap();

        match store.update_list(&list.id, "2", Some("Stolen"), None, None) {
            Err(Error::Forbidden { .. }) => {}
            other => panic!("expected Forbidden, got {:?}", other),
        }

        let updated = store
            .update_list(&list.id, "1", Some("Songbirds II"), None, Some(true))
            .unwrap();
        assert_eq!(updated.name, "Songbirds II");
        assert!(updated.private);

        match store.delete_list(&list.id, "2") {
            Err(Error::Forbidden { .. }) => {}
            other => panic!("expected Forbidden, got {:?}", other),
        }
        assert!(store.delete_list(&list.id, "1").unwrap());
        assert!(!store.delete_list(&list.id, "1").unwrap());
    }

    #[test]
    fn membership_mirrors_and_idempotence() {
        let store = Store::seeded();
        let list = store.create_list("1", "Waders", "", false).unwrap();

        store.add_list_member(&list.id, "1", "2").unwrap();
        store.add_list_member(&list.id, "1", "2").unwrap();
        assert_eq!(store.list_members(&list.id).unwrap().len(), 1);
        assert!(store
            .get_user("2")
            .unwrap()
            .member_of_lists
            .contains(&list.id));

        store.remove_list_member(&list.id, "1", "2").unwrap();
        assert!(store.list_members(&list.id).unwrap().is_empty());
        // removing again is still fine
        store.remove_list_member(&list.id, "1", "2").unwrap();
    }

    #[test]
    fn member_management_requires_owner() {
        let store = Store::seeded();
        let list = store.create_list("1", "Waders", "", false).unwrap();
        match store.add_list_member(&list.id, "3", "2") {
            Err(Error::Forbidden { .. }) => {}
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn list_tweets_come_from_members() {
        let store = Store::seeded();
        let list = store.create_list("1", "Waders", "", false).unwrap();
        store.add_list_member(&list.id, "1", "2").unwrap();
        let t = store.create_tweet(TweetDraft::new("wren news"), "2").unwrap();
        store.create_tweet(TweetDraft::new("finch news"), "3").unwrap();

        let tweets = store.list_tweets(&list.id).unwrap();
        assert!(tweets.iter().any(|x| x.id == t.id));
        assert!(tweets.iter().all(|x| x.author_id == "2"));
    }

    #[test]
    fn pin_and_follow_round_trip() {
        let store = Store::seeded();
        let list = store.create_list("1", "Waders", "", false).unwrap();

        store.pin_list("0", &list.id).unwrap();
        store.pin_list("0", &list.id).unwrap();
        assert_eq!(store.pinned_lists_of("0").unwrap().len(), 1);
        store.unpin_list("0", &list.id).unwrap();
        assert!(store.pinned_lists_of("0").unwrap().is_empty());

        store.follow_list("0", &list.id).unwrap();
        assert_eq!(store.followed_lists_of("0").unwrap().len(), 1);
        assert_eq!(store.list_followers(&list.id).unwrap()[0].id, "0");
        store.unfollow_list("0", &list.id).unwrap();
        assert!(store.followed_lists_of("0").unwrap().is_empty());
    }

    #[test]
    fn deleting_a_list_repairs_user_indices() {
        let store = Store::seeded();
        let list = store.create_list("1", "Waders", "", false).unwrap();
        store.add_list_member(&list.id, "1", "2").unwrap();
        store.pin_list("2", &list.id).unwrap();
        store.follow_list("3", &list.id).unwrap();

        store.delete_list(&list.id, "1").unwrap();
        assert!(store.get_user("2").unwrap().member_of_lists.is_empty());
        assert!(store.get_user("2").unwrap().pinned_lists.is_empty());
        assert!(store.get_user("3").unwrap().followed_lists.is_empty());
        assert!(store.get_user("1").unwrap().owned_lists.is_empty());
    }
}

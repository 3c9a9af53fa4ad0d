// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Spaces: lookup, creator lookup, and title search.

use serde_json::{json, Map, Value};

use crate::common::{now_rfc3339, Cancel};
use crate::error::{Error, ResourceError, Result};

use super::tweet::cmp_ids;
use super::{Store, Tweet};

/// One audio space. The creator is a strong reference to a user.
#[derive(Clone, Debug)]
pub struct Space {
    pub id: String,
    pub title: String,
    pub state: String,
    pub creator_id: String,
    pub created_at: String,
    pub host_ids: Vec<String>,
    pub participant_count: u32,
    pub lang: String,
}

impl Space {
    pub fn new(id: String, title: &str, creator_id: &str) -> Space {
        Space {
            id,
            title: title.to_string(),
            state: "live".to_string(),
            creator_id: creator_id.to_string(),
            created_at: now_rfc3339(),
            host_ids: vec![creator_id.to_string()],
            participant_count: 0,
            lang: "en".to_string(),
        }
    }

    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("state".into(), json!(self.state));
        map.insert("title".into(), json!(self.title));
        map.insert("creator_id".into(), json!(self.creator_id));
        map.insert("created_at".into(), json!(self.created_at));
        map.insert("host_ids".into(), json!(self.host_ids));
        map.insert("participant_count".into(), json!(self.participant_count));
        map.insert("lang".into(), json!(self.lang));
        map
    }
}

impl Store {
    pub fn get_space(&self, id: &str) -> Option<Space> {
        self.read().spaces.get(id).cloned()
    }

    pub fn get_spaces(&self, ids: &[String]) -> (Vec<Space>, Vec<String>) {
        let inner = self.read();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match inner.spaces.get(id) {
                Some(space) => found.push(space.clone()),
                None => missing.push(id.clone()),
            }
        }
        (found, missing)
    }

    /// Case-insensitive title search, optionally filtered by state.
    pub fn search_spaces(&self, cancel: &Cancel, query: &str, state: Option<&str>) -> Vec<Space> {
        let needle = query.to_lowercase();
        let inner = self.read();
        let mut hits = Vec::new();
        for (i, space) in inner.spaces.values().enumerate() {
            if i % 100 == 0 && cancel.cancelled() {
                break;
            }
            if !space.title.to_lowercase().contains(&needle) {
                continue;
            }
            if let Some(state) = state {
                if space.state != state {
                    continue;
                }
            }
            hits.push(space.clone());
        }
        hits
    }

    /// Spaces created by any of the given users.
    pub fn spaces_by_creators(&self, creator_ids: &[String]) -> Vec<Space> {
        self.read()
            .spaces
            .values()
            .filter(|s| creator_ids.contains(&s.creator_id))
            .cloned()
            .collect()
    }

    /// Tweets shared by the space's creator, the closest the fake gets to
    /// "tweets shared in a space".
    pub fn space_tweets(&self, space_id: &str) -> Result<Vec<Tweet>> {
        let inner = self.read();
        let space = inner
            .spaces
            .get(space_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("space", space_id, "id")))?;
        let mut tweets: Vec<Tweet> = inner
            .tweets
            .values()
            .filter(|t| t.author_id == space.creator_id)
            .cloned()
            .collect();
        tweets.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        Ok(tweets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_space_is_searchable() {
        let store = Store::seeded();
        let hits = store.search_spaces(&Cancel::never(), "migration", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].creator_id, "1");

        assert!(store
            .search_spaces(&Cancel::never(), "migration", Some("ended"))
            .is_empty());
    }

    #[test]
    fn creator_lookup_and_bulk_misses() {
        let store = Store::seeded();
        let spaces = store.spaces_by_creators(&["1".to_string()]);
        assert_eq!(spaces.len(), 1);

        let (found, missing) =
            store.get_spaces(&[spaces[0].id.clone(), "404404".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(missing, vec!["404404".to_string()]);
    }

    #[test]
    fn wire_defaults_include_state() {
        let space = Space::new("9".to_string(), "Test", "1");
        let map = space.wire();
        assert_eq!(map["state"], "live");
        assert_eq!(map["host_ids"], json!(["1"]));
    }
}

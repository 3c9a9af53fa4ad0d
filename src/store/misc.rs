// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The smaller entity families: communities, notes, trends, polls,
//! places, and compliance jobs.

use serde_json::{json, Map, Value};

use crate::common::{now_rfc3339, Cancel};
use crate::error::{Error, ResourceError, Result};

use super::Store;

/// One community.
#[derive(Clone, Debug)]
pub struct Community {
    pub id: String,
    pub name: String,
    pub description: String,
    pub access: String,
    pub join_policy: String,
    pub member_count: u32,
    pub created_at: String,
    pub creator_id: String,
}

impl Community {
    pub fn new(id: &str, name: &str, creator_id: &str) -> Community {
        Community {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            access: "Public".to_string(),
            join_policy: "Open".to_string(),
            member_count: 1,
            created_at: now_rfc3339(),
            creator_id: creator_id.to_string(),
        }
    }

    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("name".into(), json!(self.name));
        map.insert("description".into(), json!(self.description));
        map.insert("access".into(), json!(self.access));
        map.insert("join_policy".into(), json!(self.join_policy));
        map.insert("member_count".into(), json!(self.member_count));
        map.insert("created_at".into(), json!(self.created_at));
        map
    }
}

/// One community note.
#[derive(Clone, Debug)]
pub struct Note {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub classification: String,
    pub created_at: String,
}

impl Note {
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert(
            "info".into(),
            json!({
                "text": self.text,
                "classification": self.classification,
            }),
        );
        map.insert("created_at".into(), json!(self.created_at));
        map
    }
}

/// One entry of a by-woeid trend list.
#[derive(Clone, Debug)]
pub struct Trend {
    pub trend_name: String,
    pub tweet_count: u64,
}

impl Trend {
    pub fn new(name: &str, tweet_count: u64) -> Trend {
        Trend {
            trend_name: name.to_string(),
            tweet_count,
        }
    }

    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("trend_name".into(), json!(self.trend_name));
        map.insert("tweet_count".into(), json!(self.tweet_count));
        map
    }
}

/// One personalized trend.
#[derive(Clone, Debug)]
pub struct PersonalizedTrend {
    pub trend_name: String,
    pub category: String,
    pub post_count: u64,
}

impl PersonalizedTrend {
    pub fn new(name: &str, category: &str, post_count: u64) -> PersonalizedTrend {
        PersonalizedTrend {
            trend_name: name.to_string(),
            category: category.to_string(),
            post_count,
        }
    }

    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("trend_name".into(), json!(self.trend_name));
        map.insert("category".into(), json!(self.category));
        map.insert("post_count".into(), json!(self.post_count));
        map
    }
}

/// One poll, attachable to tweets.
#[derive(Clone, Debug)]
pub struct Poll {
    pub id: String,
    pub options: Vec<(String, u64)>,
    pub duration_minutes: u32,
    pub voting_status: String,
}

impl Poll {
    pub fn wire(&self) -> Map<String, Value> {
        let options: Vec<Value> = self
            .options
            .iter()
            .enumerate()
            .map(|(i, (label, votes))| {
                json!({"position": i + 1, "label": label, "votes": votes})
            })
            .collect();
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("options".into(), Value::Array(options));
        map.insert("duration_minutes".into(), json!(self.duration_minutes));
        map.insert("voting_status".into(), json!(self.voting_status));
        map
    }
}

/// One place, referenced by the `geo.place_id` expansion.
#[derive(Clone, Debug)]
pub struct Place {
    pub id: String,
    pub full_name: String,
    pub name: String,
    pub country: String,
    pub country_code: String,
    pub place_type: String,
}

impl Place {
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("full_name".into(), json!(self.full_name));
        map.insert("name".into(), json!(self.name));
        map.insert("country".into(), json!(self.country));
        map.insert("country_code".into(), json!(self.country_code));
        map.insert("place_type".into(), json!(self.place_type));
        map
    }
}

/// One compliance job. Status advances one step per poll.
#[derive(Clone, Debug)]
pub struct ComplianceJob {
    pub id: String,
    pub job_type: String,
    pub name: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl ComplianceJob {
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("type".into(), json!(self.job_type));
        if let Some(name) = &self.name {
            map.insert("name".into(), json!(name));
        }
        map.insert("status".into(), json!(self.status));
        map.insert("created_at".into(), json!(self.created_at));
        map.insert(
            "upload_url".into(),
            json!(format!("https://storage.example/up/{}", self.id)),
        );
        map.insert(
            "download_url".into(),
            json!(format!("https://storage.example/down/{}", self.id)),
        );
        map
    }
}

impl Store {
    pub fn get_community(&self, id: &str) -> Option<Community> {
        self.read().communities.get(id).cloned()
    }

    /// Case-insensitive name/description search.
    pub fn search_communities(&self, cancel: &Cancel, query: &str) -> Vec<Community> {
        let needle = query.to_lowercase();
        let inner = self.read();
        let mut hits = Vec::new();
        for (i, community) in inner.communities.values().enumerate() {
            if i % 100 == 0 && cancel.cancelled() {
                break;
            }
            if community.name.to_lowercase().contains(&needle)
                || community.description.to_lowercase().contains(&needle)
            {
                hits.push(community.clone());
            }
        }
        hits
    }

    /// Notes written by the given participant (all notes when `None`).
    pub fn notes_written(&self, author_id: Option<&str>) -> Vec<Note> {
        self.read()
            .notes
            .values()
            .filter(|n| author_id.map_or(true, |a| n.author_id == a))
            .cloned()
            .collect()
    }

    pub fn trends_for_woeid(&self, woeid: u32) -> Option<Vec<Trend>> {
        self.read().trends.get(&woeid).cloned()
    }

    pub fn personalized_trends(&self) -> Vec<PersonalizedTrend> {
        self.read().personalized_trends.clone()
    }

    /// Creates a poll for a freshly drafted tweet.
    pub fn create_poll(&self, labels: &[String], duration_minutes: u32) -> Poll {
        let poll = Poll {
            id: self.next_id(),
            options: labels.iter().map(|l| (l.clone(), 0)).collect(),
            duration_minutes,
            voting_status: "open".to_string(),
        };
        self.write().polls.insert(poll.id.clone(), poll.clone());
        poll
    }

    pub fn get_poll(&self, id: &str) -> Option<Poll> {
        self.read().polls.get(id).cloned()
    }

    pub fn get_place(&self, id: &str) -> Option<Place> {
        self.read().places.get(id).cloned()
    }

    pub fn create_compliance_job(&self, job_type: &str, name: Option<&str>) -> ComplianceJob {
        let job = ComplianceJob {
            id: self.next_id(),
            job_type: job_type.to_string(),
            name: name.map(String::from),
            status: "created".to_string(),
            created_at: now_rfc3339(),
        };
        self.write()
            .compliance_jobs
            .insert(job.id.clone(), job.clone());
        job
    }

    /// Fetches a job, advancing its status one step per poll:
    /// `created` → `in_progress` → `complete`.
    pub fn get_compliance_job(&self, id: &str) -> Result<ComplianceJob> {
        let mut inner = self.write();
        let job = inner
            .compliance_jobs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("compliance_job", id, "id")))?;
        job.status = match job.status.as_str() {
            "created" => "in_progress".to_string(),
            _ => "complete".to_string(),
        };
        Ok(job.clone())
    }

    pub fn compliance_jobs(&self, job_type: Option<&str>) -> Vec<ComplianceJob> {
        self.read()
            .compliance_jobs
            .values()
            .filter(|j| job_type.map_or(true, |t| j.job_type == t))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_trends_and_communities_resolve() {
        let store = Store::seeded();
        let trends = store.trends_for_woeid(1).unwrap();
        assert!(!trends.is_empty());
        assert!(store.trends_for_woeid(23424977).is_none());

        assert!(!store.personalized_trends().is_empty());
        let hits = store.search_communities(&Cancel::never(), "backyard");
        assert_eq!(hits.len(), 1);
        assert!(store.get_community(&hits[0].id).is_some());
    }

    #[test]
    fn compliance_jobs_advance_per_poll() {
        let store = Store::new();
        let job = store.create_compliance_job("tweets", Some("nightly"));
        assert_eq!(job.status, "created");
        assert_eq!(store.get_compliance_job(&job.id).unwrap().status, "in_progress");
        assert_eq!(store.get_compliance_job(&job.id).unwrap().status, "complete");
        assert_eq!(store.get_compliance_job(&job.id).unwrap().status, "complete");

        assert_eq!(store.compliance_jobs(Some("tweets")).len(), 1);
        assert!(store.compliance_jobs(Some("users")).is_empty());
    }

    #[test]
    fn polls_render_positions() {
        let store = Store::new();
        let poll = store.create_poll(
            &["yes".to_string(), "no".to_string()],
            60,
        );
        let map = store.get_poll(&poll.id).unwrap().wire();
        assert_eq!(map["options"][0]["position"], 1);
        assert_eq!(map["options"][1]["label"], "no");
        assert_eq!(map["voting_status"], "open");
    }
}

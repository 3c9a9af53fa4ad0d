// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The response shaper: trims wire maps to the requested field selection,
//! reinstates fields implied by expansions, resolves the expansions into
//! `includes`, and assembles the final envelope.
//!
//! Shaping rules, as the production service applies them:
//!
//! * with no `{type}.fields`, an entity renders its default set; with a
//!   selection, the default set plus the selection;
//! * tweets always keep `id`, `text`, and `edit_history_tweet_ids`
//!   regardless of the selection;
//! * requesting an expansion whose source field was filtered out brings
//!   the field back on the primary object;
//! * `includes` is present (even empty) whenever any expansion was
//!   requested, and entities inside it are deduplicated by id and subject
//!   to their own type's field selection.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::common::envelope::{Envelope, Includes, Meta};
use crate::query::QueryParams;
use crate::store::{
    Community, ComplianceJob, DmEvent, List, Media, PersonalizedTrend, Space, Store, Trend, Tweet,
    User,
};

/// Default field sets per object type.
const TWEET_DEFAULTS: &[&str] = &["id", "text", "edit_history_tweet_ids"];
const USER_DEFAULTS: &[&str] = &["id", "name", "username"];
const LIST_DEFAULTS: &[&str] = &["id", "name"];
const SPACE_DEFAULTS: &[&str] = &["id", "state"];
const MEDIA_DEFAULTS: &[&str] = &["media_key", "type"];
const DM_EVENT_DEFAULTS: &[&str] = &["id", "event_type", "text"];

/// Fields tweets never lose, whatever the selection says.
const TWEET_MANDATORY: &[&str] = &["id", "text", "edit_history_tweet_ids"];

/// What a handler produced, before shaping.
#[derive(Clone, Debug)]
pub enum Payload {
    Tweet(Tweet),
    Tweets(Vec<Tweet>),
    User(User),
    Users(Vec<User>),
    List(List),
    Lists(Vec<List>),
    Space(Space),
    Spaces(Vec<Space>),
    MediaItem(Media),
    DmEvents(Vec<DmEvent>),
    Community(Community),
    Communities(Vec<Community>),
    Trends(Vec<Trend>),
    PersonalizedTrends(Vec<PersonalizedTrend>),
    ComplianceJob(ComplianceJob),
    ComplianceJobs(Vec<ComplianceJob>),
    /// Pre-shaped JSON; the shaper passes it through untouched.
    Raw(Value),
    /// No `data` at all (errors-only envelopes).
    Empty,
}

/// A handler's result: payload plus envelope extras.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub status: hyper::StatusCode,
    pub payload: Payload,
    /// Partial errors for the 200-with-errors convention.
    pub errors: Vec<Value>,
    /// Search/pagination meta; `result_count` is filled by the shaper for
    /// collections when the handler left it unset.
    pub meta: Meta,
}

impl Outcome {
    pub fn ok(payload: Payload) -> Outcome {
        Outcome {
            status: hyper::StatusCode::OK,
            payload,
            errors: Vec::new(),
            meta: Meta::default(),
        }
    }

    pub fn created(payload: Payload) -> Outcome {
        Outcome {
            status: hyper::StatusCode::CREATED,
            ..Outcome::ok(payload)
        }
    }

    pub fn raw(value: Value) -> Outcome {
        Outcome::ok(Payload::Raw(value))
    }

    pub fn with_meta(mut self, meta: Meta) -> Outcome {
        self.meta = meta;
        self
    }

    pub fn with_errors(mut self, errors: Vec<Value>) -> Outcome {
        self.errors = errors;
        self
    }
}

/// Shapes one outcome against the request's query parameters.
pub fn shape(store: &Store, query: &QueryParams, outcome: Outcome) -> (hyper::StatusCode, Value) {
    let mut envelope = Envelope {
        includes_requested: query.has_expansions() && shapeable(&outcome.payload),
        meta: outcome.meta.clone(),
        errors: outcome.errors.clone(),
        ..Envelope::default()
    };

    let mut includes = IncludeSet::default();
    let data = match &outcome.payload {
        Payload::Tweet(tweet) => Some(shape_tweet(store, query, tweet, &mut includes)),
        Payload::Tweets(tweets) => Some(shape_collection(
            &mut envelope.meta,
            tweets.iter().map(|t| shape_tweet(store, query, t, &mut includes)),
        )),
        Payload::User(user) => Some(shape_user(query, user, &mut includes)),
        Payload::Users(users) => Some(shape_collection(
            &mut envelope.meta,
            users.iter().map(|u| shape_user(query, u, &mut includes)),
        )),
        Payload::List(list) => Some(shape_list(query, list, &mut includes)),
        Payload::Lists(lists) => Some(shape_collection(
            &mut envelope.meta,
            lists.iter().map(|l| shape_list(query, l, &mut includes)),
        )),
        Payload::Space(space) => Some(shape_space(query, space, &mut includes)),
        Payload::Spaces(spaces) => Some(shape_collection(
            &mut envelope.meta,
            spaces.iter().map(|s| shape_space(query, s, &mut includes)),
        )),
        Payload::MediaItem(media) => Some(Value::Object(filter_fields(
            media.wire(),
            MEDIA_DEFAULTS,
            query.fields_for("media"),
            &[],
        ))),
        Payload::DmEvents(events) => Some(shape_collection(
            &mut envelope.meta,
            events.iter().map(|e| {
                Value::Object(filter_fields(
                    e.wire(),
                    DM_EVENT_DEFAULTS,
                    query.fields_for("dm_event"),
                    &[],
                ))
            }),
        )),
        Payload::Community(community) => Some(Value::Object(community.wire())),
        Payload::Communities(communities) => Some(shape_collection(
            &mut envelope.meta,
            communities.iter().map(|c| Value::Object(c.wire())),
        )),
        Payload::Trends(trends) => Some(Value::Array(
            trends.iter().map(|t| Value::Object(t.wire())).collect(),
        )),
        Payload::PersonalizedTrends(trends) => Some(Value::Array(
            trends.iter().map(|t| Value::Object(t.wire())).collect(),
        )),
        Payload::ComplianceJob(job) => Some(Value::Object(job.wire())),
        Payload::ComplianceJobs(jobs) => Some(shape_collection(
            &mut envelope.meta,
            jobs.iter().map(|j| Value::Object(j.wire())),
        )),
        Payload::Raw(value) => Some(value.clone()),
        Payload::Empty => None,
    };

    envelope.data = data;
    envelope.includes = includes.finish(store, query);
    (outcome.status, envelope.to_value())
}

fn shapeable(payload: &Payload) -> bool {
    !matches!(payload, Payload::Raw(_) | Payload::Empty)
}

fn shape_collection(
    meta: &mut Meta,
    items: impl Iterator<Item = Value>,
) -> Value {
    let items: Vec<Value> = items.collect();
    if meta.result_count.is_none() {
        meta.result_count = Some(items.len());
    }
    Value::Array(items)
}

/// Ids collected while shaping, resolved into `includes` afterwards so
/// that entities land deduplicated and in first-seen order.
#[derive(Default)]
struct IncludeSet {
    users: Vec<String>,
    tweets: Vec<String>,
    media: Vec<String>,
    polls: Vec<String>,
    places: Vec<String>,
    seen: BTreeSet<(u8, String)>,
}

impl IncludeSet {
    fn push(&mut self, group: u8, id: String) {
        if self.seen.insert((group, id.clone())) {
            match group {
                0 => self.users.push(id),
                1 => self.tweets.push(id),
                2 => self.media.push(id),
                3 => self.polls.push(id),
                _ => self.places.push(id),
            }
        }
    }

    fn user(&mut self, id: &str) {
        self.push(0, id.to_string());
    }

    fn tweet(&mut self, id: &str) {
        self.push(1, id.to_string());
    }

    fn finish(self, store: &Store, query: &QueryParams) -> Includes {
        let mut includes = Includes::default();
        for id in &self.users {
            if let Some(user) = store.get_user(id) {
                includes.users.push(Value::Object(filter_fields(
                    user.wire(),
                    USER_DEFAULTS,
                    query.fields_for("user"),
                    &[],
                )));
            }
        }
        for id in &self.tweets {
            if let Some(tweet) = store.get_tweet(id) {
                includes.tweets.push(Value::Object(filter_fields(
                    tweet.wire(),
                    TWEET_DEFAULTS,
                    query.fields_for("tweet"),
                    TWEET_MANDATORY,
                )));
            }
        }
        for key in &self.media {
            if let Some(media) = store.get_media_by_key(key) {
                includes.media.push(Value::Object(filter_fields(
                    media.wire(),
                    MEDIA_DEFAULTS,
                    query.fields_for("media"),
                    &[],
                )));
            }
        }
        for id in &self.polls {
            if let Some(poll) = store.get_poll(id) {
                includes.polls.push(Value::Object(poll.wire()));
            }
        }
        for id in &self.places {
            if let Some(place) = store.get_place(id) {
                includes.places.push(Value::Object(place.wire()));
            }
        }
        includes
    }
}

fn shape_tweet(
    store: &Store,
    query: &QueryParams,
    tweet: &Tweet,
    includes: &mut IncludeSet,
) -> Value {
    let mut reinstated: Vec<&str> = Vec::new();
    for expansion in &query.expansions {
        match expansion.as_str() {
            "author_id" => {
                reinstated.push("author_id");
                includes.user(&tweet.author_id);
            }
            "in_reply_to_user_id" => {
                reinstated.push("in_reply_to_user_id");
                if let Some(user) = &tweet.in_reply_to_user_id {
                    includes.user(user);
                }
            }
            "referenced_tweets.id" => {
                reinstated.push("referenced_tweets");
                for reference in &tweet.referenced_tweets {
                    includes.tweet(&reference.id);
                }
            }
            "referenced_tweets.id.author_id" => {
                reinstated.push("referenced_tweets");
                for reference in &tweet.referenced_tweets {
                    if let Some(parent) = store.get_tweet(&reference.id) {
                        includes.user(&parent.author_id);
                    }
                }
            }
            "attachments.media_keys" => {
                reinstated.push("attachments");
                for key in &tweet.attachments_media_keys {
                    includes.push(2, key.clone());
                }
            }
            "attachments.poll_ids" => {
                reinstated.push("attachments");
                for id in &tweet.attachments_poll_ids {
                    includes.push(3, id.clone());
                }
            }
            "entities.mentions.username" => {
                for user in mentioned_users(store, &tweet.text) {
                    includes.user(&user);
                }
            }
            _ => {}
        }
    }
    Value::Object(filter_fields(
        tweet.wire(),
        TWEET_DEFAULTS,
        query.fields_for("tweet"),
        &merge_mandatory(TWEET_MANDATORY, &reinstated),
    ))
}

fn shape_user(query: &QueryParams, user: &User, includes: &mut IncludeSet) -> Value {
    let mut reinstated: Vec<&str> = Vec::new();
    for expansion in &query.expansions {
        if expansion == "pinned_tweet_id" {
            reinstated.push("pinned_tweet_id");
            if let Some(pinned) = &user.pinned_tweet_id {
                includes.tweet(pinned);
            }
        }
    }
    Value::Object(filter_fields(
        user.wire(),
        USER_DEFAULTS,
        query.fields_for("user"),
        &merge_mandatory(&[], &reinstated),
    ))
}

fn shape_list(query: &QueryParams, list: &List, includes: &mut IncludeSet) -> Value {
    let mut reinstated: Vec<&str> = Vec::new();
    for expansion in &query.expansions {
        if expansion == "owner_id" {
            reinstated.push("owner_id");
            includes.user(&list.owner_id);
        }
    }
    Value::Object(filter_fields(
        list.wire(),
        LIST_DEFAULTS,
        query.fields_for("list"),
        &merge_mandatory(&[], &reinstated),
    ))
}

fn shape_space(query: &QueryParams, space: &Space, includes: &mut IncludeSet) -> Value {
    let mut reinstated: Vec<&str> = Vec::new();
    for expansion in &query.expansions {
        match expansion.as_str() {
            "creator_id" => {
                reinstated.push("creator_id");
                includes.user(&space.creator_id);
            }
            "host_ids" => {
                reinstated.push("host_ids");
                for host in &space.host_ids {
                    includes.user(host);
                }
            }
            _ => {}
        }
    }
    Value::Object(filter_fields(
        space.wire(),
        SPACE_DEFAULTS,
        query.fields_for("space"),
        &merge_mandatory(&[], &reinstated),
    ))
}

fn merge_mandatory<'a>(mandatory: &[&'a str], reinstated: &[&'a str]) -> Vec<&'a str> {
    let mut merged: Vec<&str> = mandatory.to_vec();
    for field in reinstated {
        if !merged.contains(field) {
            merged.push(field);
        }
    }
    merged
}

/// Restricts a wire map to `defaults ∪ requested ∪ mandatory`. With no
/// selection the map keeps only the defaults (plus mandatory).
fn filter_fields(
    full: Map<String, Value>,
    defaults: &[&str],
    requested: Option<&[String]>,
    mandatory: &[&str],
) -> Map<String, Value> {
    let mut keep: BTreeSet<&str> = defaults.iter().copied().collect();
    keep.extend(mandatory.iter().copied());
    if let Some(requested) = requested {
        keep.extend(requested.iter().map(String::as_str));
    }
    full.into_iter()
        .filter(|(name, _)| keep.contains(name.as_str()))
        .collect()
}

/// Resolves `@handle` mentions in a text to user ids.
fn mentioned_users(store: &Store, text: &str) -> Vec<String> {
    let mut users = Vec::new();
    for word in text.split_whitespace() {
        if let Some(handle) = word.strip_prefix('@') {
            let handle = handle.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
            if let Some(user) = store.get_user_by_username(handle) {
                users.push(user.id);
            }
        }
    }
    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TweetDraft;

    fn query(q: &str) -> QueryParams {
        QueryParams::parse(Some(q))
    }

    #[test]
    fn default_fields_without_selection() {
        let store = Store::seeded();
        let tweet = store.create_tweet(TweetDraft::new("plain"), "1").unwrap();

        let (status, body) = shape(
            &store,
            &QueryParams::default(),
            Outcome::ok(Payload::Tweet(tweet)),
        );
        assert_eq!(status, hyper::StatusCode::OK);
        let keys: Vec<&str> = body["data"].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["edit_history_tweet_ids", "id", "text"]);
        assert!(body.get("includes").is_none());
    }

    #[test]
    fn selection_is_defaults_union_requested() {
        let store = Store::seeded();
        let user = store.get_user("1").unwrap();

        let (_, body) = shape(
            &store,
            &query("user.fields=created_at,description"),
            Outcome::ok(Payload::User(user)),
        );
        let map = body["data"].as_object().unwrap();
        for key in &["id", "name", "username", "created_at", "description"] {
            assert!(map.contains_key(*key), "missing {}", key);
        }
        assert!(!map.contains_key("public_metrics"));
    }

    #[test]
    fn tweets_never_lose_their_mandatory_fields() {
        let store = Store::seeded();
        let tweet = store.create_tweet(TweetDraft::new("kept"), "1").unwrap();

        let (_, body) = shape(
            &store,
            &query("tweet.fields=created_at"),
            Outcome::ok(Payload::Tweet(tweet)),
        );
        let map = body["data"].as_object().unwrap();
        assert!(map.contains_key("id"));
        assert!(map.contains_key("text"));
        assert!(map.contains_key("edit_history_tweet_ids"));
        assert!(map.contains_key("created_at"));
    }

    #[test]
    fn expansion_reinstates_and_fills_includes() {
        let store = Store::seeded();
        let tweet = store.create_tweet(TweetDraft::new("expand me"), "1").unwrap();

        let (_, body) = shape(
            &store,
            &query("expansions=author_id"),
            Outcome::ok(Payload::Tweet(tweet)),
        );
        // author_id is not in the default set, but the expansion brings it back
        assert_eq!(body["data"]["author_id"], "1");
        let users = body["includes"]["users"].as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], "1");
    }

    #[test]
    fn includes_deduplicate_by_id() {
        let store = Store::seeded();
        let a = store.create_tweet(TweetDraft::new("one"), "1").unwrap();
        let b = store.create_tweet(TweetDraft::new("two"), "1").unwrap();

        let (_, body) = shape(
            &store,
            &query("expansions=author_id"),
            Outcome::ok(Payload::Tweets(vec![a, b])),
        );
        assert_eq!(body["includes"]["users"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn requested_expansions_force_an_includes_object() {
        let store = Store::seeded();
        let user = store.get_user("3").unwrap();

        // user 3 has no pinned tweet, so nothing resolves
        let (_, body) = shape(
            &store,
            &query("expansions=pinned_tweet_id"),
            Outcome::ok(Payload::User(user)),
        );
        assert_eq!(body["includes"], serde_json::json!({}));
    }

    #[test]
    fn collections_count_themselves() {
        let store = Store::seeded();
        let users = vec![store.get_user("1").unwrap(), store.get_user("2").unwrap()];
        let (_, body) = shape(&store, &QueryParams::default(), Outcome::ok(Payload::Users(users)));
        assert_eq!(body["meta"]["result_count"], 2);
    }

    #[test]
    fn raw_payloads_pass_through() {
        let store = Store::seeded();
        let (_, body) = shape(
            &store,
            &query("expansions=author_id"),
            Outcome::ok(Payload::Raw(serde_json::json!({"deleted": true}))),
        );
        assert_eq!(body["data"]["deleted"], true);
        assert!(body.get("includes").is_none());
    }
}

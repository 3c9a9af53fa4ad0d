// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Infrastructure types for assembling the v2 wire envelopes and the
//! rate-limit information that accompanies every served response.

use hyper::header::{HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{Headers, X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET};

/// A snapshot of one sliding-window counter, written out as the
/// `x-rate-limit-*` header trio.
///
/// Clients of the real service read these three headers to pace themselves;
/// the fake emits them on every response, including errors, so that the
/// pacing logic under test sees production-shaped data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, derive_more::Constructor)]
pub struct RateLimit {
    /// The rate limit ceiling for the matched endpoint.
    pub limit: u32,
    /// The number of requests left in the current window.
    pub remaining: u32,
    /// The UTC Unix timestamp at which the window resets.
    pub reset: i64,
}

impl RateLimit {
    /// Writes the header trio into the given response headers.
    pub fn write_headers(&self, headers: &mut Headers) {
        let pairs = [
            (X_RATE_LIMIT_LIMIT, self.limit.to_string()),
            (X_RATE_LIMIT_REMAINING, self.remaining.to_string()),
            (X_RATE_LIMIT_RESET, self.reset.to_string()),
        ];
        for (name, val) in &pairs {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(val),
            ) {
                headers.insert(name, val);
            }
        }
    }
}

/// The `meta` object attached to collection and search responses.
///
/// All fields are optional; only the populated ones appear on the wire.
#[derive(Clone, Debug, Default)]
pub struct Meta {
    /// Number of primary entities in `data`.
    pub result_count: Option<usize>,
    /// Highest id in the page, for search responses.
    pub newest_id: Option<String>,
    /// Lowest id in the page, for search responses.
    pub oldest_id: Option<String>,
    /// Opaque cursor for the next page, present when the page filled.
    pub next_token: Option<String>,
    /// Opaque cursor for the previous page.
    pub previous_token: Option<String>,
    /// Endpoint-specific meta members (`sent`, `summary`,
    /// `total_tweet_count`, ...), merged into the object as-is.
    pub extra: Map<String, Value>,
}

impl Meta {
    /// Meta for a plain collection response: just `result_count`.
    pub fn collection(count: usize) -> Meta {
        Meta {
            result_count: Some(count),
            ..Meta::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result_count.is_none()
            && self.newest_id.is_none()
            && self.oldest_id.is_none()
            && self.next_token.is_none()
            && self.previous_token.is_none()
            && self.extra.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(id) = &self.newest_id {
            map.insert("newest_id".into(), json!(id));
        }
        if let Some(id) = &self.oldest_id {
            map.insert("oldest_id".into(), json!(id));
        }
        if let Some(count) = self.result_count {
            map.insert("result_count".into(), json!(count));
        }
        if let Some(token) = &self.next_token {
            map.insert("next_token".into(), json!(token));
        }
        if let Some(token) = &self.previous_token {
            map.insert("previous_token".into(), json!(token));
        }
        for (name, value) in &self.extra {
            map.insert(name.clone(), value.clone());
        }
        Value::Object(map)
    }
}

/// Expanded entities collected by the response shaper, grouped the way the
/// `includes` object groups them on the wire.
#[derive(Clone, Debug, Default)]
pub struct Includes {
    pub users: Vec<Value>,
    pub tweets: Vec<Value>,
    pub media: Vec<Value>,
    pub polls: Vec<Value>,
    pub places: Vec<Value>,
    pub topics: Vec<Value>,
}

impl Includes {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.tweets.is_empty()
            && self.media.is_empty()
            && self.polls.is_empty()
            && self.places.is_empty()
            && self.topics.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        let groups = [
            ("users", &self.users),
            ("tweets", &self.tweets),
            ("media", &self.media),
            ("polls", &self.polls),
            ("places", &self.places),
            ("topics", &self.topics),
        ];
        for (name, group) in &groups {
            if !group.is_empty() {
                map.insert((*name).into(), Value::Array((*group).clone()));
            }
        }
        Value::Object(map)
    }
}

/// A fully shaped response body: `{data, includes?, meta?, errors?}`.
///
/// `includes_requested` tracks whether the client asked for any expansion at
/// all; when it did, the `includes` object is emitted even if no referenced
/// entity resolved, matching the production service.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub data: Option<Value>,
    pub includes: Includes,
    pub includes_requested: bool,
    pub meta: Meta,
    pub errors: Vec<Value>,
}

impl Envelope {
    /// An envelope carrying a single primary entity.
    pub fn data(value: Value) -> Envelope {
        Envelope {
            data: Some(value),
            ..Envelope::default()
        }
    }

    /// An envelope carrying a collection plus its `result_count`.
    pub fn collection(items: Vec<Value>) -> Envelope {
        let count = items.len();
        Envelope {
            data: Some(Value::Array(items)),
            meta: Meta::collection(count),
            ..Envelope::default()
        }
    }

    /// An envelope carrying only partial-error objects (the 200-with-errors
    /// convention for failed lookups).
    pub fn errors_only(errors: Vec<Value>) -> Envelope {
        Envelope {
            errors,
            ..Envelope::default()
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(data) = &self.data {
            map.insert("data".into(), data.clone());
        }
        if self.includes_requested || !self.includes.is_empty() {
            map.insert("includes".into(), self.includes.to_value());
        }
        if !self.meta.is_empty() {
            map.insert("meta".into(), self.meta.to_value());
        }
        if !self.errors.is_empty() {
            map.insert("errors".into(), Value::Array(self.errors.clone()));
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_headers_round_trip() {
        let mut headers = Headers::new();
        RateLimit::new(300, 297, 1660000000).write_headers(&mut headers);

        assert_eq!(headers.get(X_RATE_LIMIT_LIMIT).unwrap(), "300");
        assert_eq!(headers.get(X_RATE_LIMIT_REMAINING).unwrap(), "297");
        assert_eq!(headers.get(X_RATE_LIMIT_RESET).unwrap(), "1660000000");
    }

    #[test]
    fn empty_meta_and_includes_are_omitted() {
        let body = Envelope::data(json!({"id": "1"})).to_value();
        let map = body.as_object().unwrap();
        assert!(map.contains_key("data"));
        assert!(!map.contains_key("meta"));
        assert!(!map.contains_key("includes"));
        assert!(!map.contains_key("errors"));
    }

    #[test]
    fn requested_includes_appear_even_when_empty() {
        let mut env = Envelope::data(json!([]));
        env.includes_requested = true;
        let body = env.to_value();
        assert_eq!(body["includes"], json!({}));
    }

    #[test]
    fn collection_meta_counts() {
        let env = Envelope::collection(vec![json!({"id": "1"}), json!({"id": "2"})]);
        let body = env.to_value();
        assert_eq!(body["meta"]["result_count"], json!(2));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The streaming runtime: long-lived newline-delimited JSON responses for
//! the filtered, sample, and firehose stream endpoints.
//!
//! Each connection runs as its own task feeding a hyper body channel. The
//! loop wakes every configured delay, emits any fresh matching tweets
//! (suppressing the last ten ids it already sent), writes a bare CRLF as
//! a keep-alive when nothing is fresh, and winds down when the client
//! disconnects, the cancellation token fires, or the optional time limit
//! elapses. Every connection registers itself so that
//! `DELETE /2/connections/all` can tear the whole set down.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Body, Bytes};
use serde_json::json;
use tokio::time::Instant;

use crate::common::Cancel;
use crate::config::Config;
use crate::links;
use crate::store::{Store, StreamRule, Tweet};

/// How many already-emitted tweet ids one connection remembers.
const DEDUP_WINDOW: usize = 10;
/// How many recent tweets each wake-up considers.
const BATCH: usize = 20;

/// Which streaming endpoint a connection serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// `/2/tweets/search/stream` — rule-filtered.
    Filtered,
    /// `/2/tweets/sample/stream` — everything, sampled.
    Sample,
    /// `/2/tweets/firehose/stream` — everything.
    Firehose,
}

impl StreamKind {
    /// Maps a matched pattern to its stream kind.
    pub fn for_pattern(pattern: &str) -> Option<StreamKind> {
        match pattern {
            p if p == links::tweets::FILTERED_STREAM => Some(StreamKind::Filtered),
            p if p == links::tweets::SAMPLE_STREAM => Some(StreamKind::Sample),
            p if p == links::tweets::FIREHOSE_STREAM => Some(StreamKind::Firehose),
            _ => None,
        }
    }
}

/// One emitted NDJSON line: the default-shaped tweet plus the matching
/// rules on the filtered stream.
pub fn render_line(tweet: &Tweet, matching: &[StreamRule]) -> String {
    let mut envelope = json!({
        "data": {
            "id": tweet.id,
            "text": tweet.text,
            "edit_history_tweet_ids": tweet.edit_history_tweet_ids,
        }
    });
    if !matching.is_empty() {
        let rules: Vec<serde_json::Value> = matching
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "tag": r.tag.clone().unwrap_or_default(),
                })
            })
            .collect();
        envelope["matching_rules"] = serde_json::Value::Array(rules);
    }
    let mut line = envelope.to_string();
    line.push_str("\r\n");
    line
}

/// The tweets one wake-up should emit, oldest-first, minus anything the
/// dedup window already saw.
fn fresh_tweets(
    store: &Store,
    kind: StreamKind,
    seen: &VecDeque<String>,
) -> Vec<(Tweet, Vec<StreamRule>)> {
    let mut batch: Vec<Tweet> = store.recent_tweets(BATCH);
    batch.reverse();
    let mut fresh = Vec::new();
    for tweet in batch {
        if seen.contains(&tweet.id) {
            continue;
        }
        match kind {
            StreamKind::Filtered => {
                let author = store.get_user(&tweet.author_id);
                let matching: Vec<StreamRule> = store
                    .stream_rules()
                    .into_iter()
                    .filter(|r| r.matches(&tweet, author.as_ref()))
                    .collect();
                if !matching.is_empty() {
                    fresh.push((tweet, matching));
                }
            }
            StreamKind::Sample | StreamKind::Firehose => fresh.push((tweet, Vec::new())),
        }
    }
    fresh
}

/// Opens a streaming response body and spawns the emission loop behind
/// it. The loop owns a connection-registry entry for its whole lifetime.
pub fn open(
    store: Arc<Store>,
    config: &Config,
    kind: StreamKind,
    fingerprint: &str,
    cancel: Cancel,
) -> Body {
    let (mut sender, body) = Body::channel();
    let delay = Duration::from_millis(config.stream_delay_ms());
    let time_limit = config.stream_time_limit_secs.map(Duration::from_secs);
    let token = store.register_connection(fingerprint, cancel.clone());
    let fingerprint = fingerprint.to_string();

    tokio::spawn(async move {
        let started = Instant::now();
        let mut seen: VecDeque<String> = VecDeque::with_capacity(DEDUP_WINDOW);
        tracing::debug!(%fingerprint, ?kind, "stream opened");

        loop {
            if cancel.cancelled() {
                break;
            }
            if let Some(limit) = time_limit {
                if started.elapsed() >= limit {
                    break;
                }
            }

            let fresh = fresh_tweets(&store, kind, &seen);
            let mut payload = String::new();
            for (tweet, matching) in &fresh {
                payload.push_str(&render_line(tweet, matching));
                if seen.len() == DEDUP_WINDOW {
                    seen.pop_front();
                }
                seen.push_back(tweet.id.clone());
            }
            if payload.is_empty() {
                // keep-alive, the same way the production stream idles
                payload.push_str("\r\n");
            }
            if sender.send_data(Bytes::from(payload)).await.is_err() {
                // client went away
                break;
            }

            tokio::time::sleep(delay).await;
        }

        store.release_connection(token);
        tracing::debug!(%fingerprint, "stream closed");
    });

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::time::timeout;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.stream_delay_ms = 10;
        config
    }

    async fn first_payload(body: &mut Body) -> String {
        let chunk = timeout(Duration::from_secs(2), body.next())
            .await
            .expect("stream produced nothing before the timeout")
            .expect("stream ended prematurely")
            .expect("stream errored");
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[test]
    fn kinds_map_from_patterns() {
        assert_eq!(
            StreamKind::for_pattern(links::tweets::FILTERED_STREAM),
            Some(StreamKind::Filtered)
        );
        assert_eq!(
            StreamKind::for_pattern(links::tweets::SAMPLE_STREAM),
            Some(StreamKind::Sample)
        );
        assert_eq!(StreamKind::for_pattern("/2/tweets"), None);
    }

    #[test]
    fn rendered_lines_are_ndjson_with_default_fields() {
        let store = Store::seeded();
        let tweet = store.recent_tweets(1).remove(0);
        let line = render_line(&tweet, &[]);
        assert!(line.ends_with("\r\n"));
        let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["data"]["id"], json!(tweet.id));
        assert!(parsed.get("matching_rules").is_none());
    }

    #[tokio::test]
    async fn sample_stream_emits_seeded_tweets() {
        let store = Arc::new(Store::seeded());
        let cancel = Cancel::new();
        let mut body = open(
            Arc::clone(&store),
            &test_config(),
            StreamKind::Sample,
            "7",
            cancel.clone(),
        );
        let payload = first_payload(&mut body).await;
        assert!(payload.contains("\"data\""));
        assert_eq!(store.connection_count(), 1);

        cancel.cancel();
        // drain until the task notices the cancellation and drops the sender
        while let Ok(Some(_)) = timeout(Duration::from_secs(2), body.next()).await {}
        assert_eq!(store.connection_count(), 0);
    }

    #[tokio::test]
    async fn filtered_stream_honours_rules_and_dedups() {
        let store = Arc::new(Store::seeded());
        store.add_stream_rules(&[("suet".to_string(), Some("food".to_string()))], false);
        let cancel = Cancel::new();
        let mut body = open(
            Arc::clone(&store),
            &test_config(),
            StreamKind::Filtered,
            "7",
            cancel.clone(),
        );

        let payload = first_payload(&mut body).await;
        assert!(payload.contains("suet"), "only the matching seed tweet");
        assert!(payload.contains("matching_rules"));
        assert!(payload.contains("\"tag\":\"food\""));

        // the next wake-up re-reads the same tweets; dedup leaves keep-alives
        let next = first_payload(&mut body).await;
        assert_eq!(next, "\r\n");

        cancel.cancel();
    }

    #[tokio::test]
    async fn filtered_stream_without_rules_stays_quiet() {
        let store = Arc::new(Store::seeded());
        let cancel = Cancel::new();
        let mut body = open(
            Arc::clone(&store),
            &test_config(),
            StreamKind::Filtered,
            "7",
            cancel.clone(),
        );
        assert_eq!(first_payload(&mut body).await, "\r\n");
        cancel.cancel();
    }
}

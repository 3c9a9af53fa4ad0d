// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tweets: creation, deletion, the engagement mirrors (likes, retweets,
//! bookmarks, replies, quotes), timelines, and search.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::common::Cancel;
use crate::error::{Error, ResourceError, Result};

use super::{Store, User};

/// How often tweet scans poll the cancellation token. Tweet collections
/// grow much larger than user collections, hence the wider stride.
const SCAN_STRIDE: usize = 1000;

/// Maximum tweet length the store accepts.
pub const MAX_TWEET_LEN: usize = 280;

lazy_static! {
    static ref HASHTAG_RE: Regex = Regex::new(r"#[A-Za-z0-9_]+").unwrap();
    static ref MENTION_RE: Regex = Regex::new(r"@[A-Za-z0-9_]{1,15}").unwrap();
    static ref URL_RE: Regex = Regex::new(r"https?://[^\s]+").unwrap();
}

/// How one tweet references another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefType {
    Retweeted,
    Quoted,
    RepliedTo,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Retweeted => "retweeted",
            RefType::Quoted => "quoted",
            RefType::RepliedTo => "replied_to",
        }
    }
}

/// One entry of a tweet's `referenced_tweets`.
#[derive(Clone, Debug, PartialEq)]
pub struct TweetReference {
    pub ref_type: RefType,
    pub id: String,
}

/// The writable surface of `POST /2/tweets`, as the handler parsed it.
#[derive(Clone, Debug, Default)]
pub struct TweetDraft {
    pub text: String,
    pub in_reply_to_tweet_id: Option<String>,
    pub quote_tweet_id: Option<String>,
    pub media_keys: Vec<String>,
    pub reply_settings: Option<String>,
}

impl TweetDraft {
    pub fn new(text: &str) -> TweetDraft {
        TweetDraft {
            text: text.to_string(),
            ..TweetDraft::default()
        }
    }
}

/// One status. Engagement edges are mirrored id sets, repaired on every
/// mutation that touches them.
#[derive(Clone, Debug)]
pub struct Tweet {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Non-empty; the first entry always references a real tweet.
    pub edit_history_tweet_ids: Vec<String>,
    pub conversation_id: String,
    pub in_reply_to_user_id: Option<String>,
    pub referenced_tweets: Vec<TweetReference>,
    pub attachments_media_keys: Vec<String>,
    pub attachments_poll_ids: Vec<String>,
    pub lang: String,
    pub source: String,
    pub reply_settings: String,
    pub possibly_sensitive: bool,
    pub liked_by: BTreeSet<String>,
    pub retweeted_by: BTreeSet<String>,
    pub bookmarked_by: BTreeSet<String>,
    pub replies: BTreeSet<String>,
    pub quotes: BTreeSet<String>,
}

impl Tweet {
    /// The full wire map; the response shaper trims it afterwards.
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("text".into(), json!(self.text));
        map.insert(
            "edit_history_tweet_ids".into(),
            json!(self.edit_history_tweet_ids),
        );
        map.insert("author_id".into(), json!(self.author_id));
        map.insert(
            "created_at".into(),
            json!(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert("conversation_id".into(), json!(self.conversation_id));
        map.insert("lang".into(), json!(self.lang));
        map.insert("source".into(), json!(self.source));
        map.insert("reply_settings".into(), json!(self.reply_settings));
        map.insert("possibly_sensitive".into(), json!(self.possibly_sensitive));
        if let Some(user) = &self.in_reply_to_user_id {
            map.insert("in_reply_to_user_id".into(), json!(user));
        }
        if !self.referenced_tweets.is_empty() {
            let refs: Vec<Value> = self
                .referenced_tweets
                .iter()
                .map(|r| json!({"type": r.ref_type.as_str(), "id": r.id}))
                .collect();
            map.insert("referenced_tweets".into(), Value::Array(refs));
        }
        if !self.attachments_media_keys.is_empty() || !self.attachments_poll_ids.is_empty() {
            let mut attachments = Map::new();
            if !self.attachments_media_keys.is_empty() {
                attachments.insert("media_keys".into(), json!(self.attachments_media_keys));
            }
            if !self.attachments_poll_ids.is_empty() {
                attachments.insert("poll_ids".into(), json!(self.attachments_poll_ids));
            }
            map.insert("attachments".into(), Value::Object(attachments));
        }
        if let Some(entities) = extract_entities(&self.text) {
            map.insert("entities".into(), entities);
        }
        map.insert(
            "public_metrics".into(),
            json!({
                "retweet_count": self.retweeted_by.len(),
                "reply_count": self.replies.len(),
                "like_count": self.liked_by.len(),
                "quote_count": self.quotes.len(),
                "bookmark_count": self.bookmarked_by.len(),
                "impression_count": 0,
            }),
        );
        map
    }
}

/// Numeric order for decimal-string ids: shorter strings sort first, equal
/// lengths compare lexicographically.
pub fn cmp_ids(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Hashtag/mention/url spans, in codepoint offsets like the real service.
fn extract_entities(text: &str) -> Option<Value> {
    let mut entities = Map::new();

    let spans = |re: &Regex, strip: usize, key: &str| -> Vec<Value> {
        re.find_iter(text)
            .map(|m| {
                let start = text[..m.start()].chars().count();
                let end = start + m.as_str().chars().count();
                let mut span = Map::new();
                span.insert("start".into(), json!(start));
                span.insert("end".into(), json!(end));
                span.insert(key.to_string(), json!(&m.as_str()[strip..]));
                Value::Object(span)
            })
            .collect()
    };

    let hashtags = spans(&HASHTAG_RE, 1, "tag");
    if !hashtags.is_empty() {
        entities.insert("hashtags".into(), Value::Array(hashtags));
    }
    let mentions = spans(&MENTION_RE, 1, "username");
    if !mentions.is_empty() {
        entities.insert("mentions".into(), Value::Array(mentions));
    }
    let urls = spans(&URL_RE, 0, "url");
    if !urls.is_empty() {
        entities.insert("urls".into(), Value::Array(urls));
    }

    if entities.is_empty() {
        None
    } else {
        Some(Value::Object(entities))
    }
}

impl Store {
    /// Creates a tweet, wiring up reply/quote mirrors and the author's
    /// back-index.
    pub fn create_tweet(&self, draft: TweetDraft, author_id: &str) -> Result<Tweet> {
        let id = self.next_id();
        let mut inner = self.write();
        if !inner.users.contains_key(author_id) {
            return Err(Error::NotFound(ResourceError::new("user", author_id, "id")));
        }

        let mut referenced = Vec::new();
        let mut in_reply_to_user_id = None;
        let mut conversation_id = id.clone();

        if let Some(parent_id) = &draft.in_reply_to_tweet_id {
            let parent = inner.tweets.get_mut(parent_id).ok_or_else(|| {
                Error::NotFound(ResourceError::new("tweet", parent_id, "in_reply_to_tweet_id"))
            })?;
            parent.replies.insert(id.clone());
            in_reply_to_user_id = Some(parent.author_id.clone());
            conversation_id = parent.conversation_id.clone();
            referenced.push(TweetReference {
                ref_type: RefType::RepliedTo,
                id: parent_id.clone(),
            });
        }
        if let Some(quoted_id) = &draft.quote_tweet_id {
            let quoted = inner.tweets.get_mut(quoted_id).ok_or_else(|| {
                Error::NotFound(ResourceError::new("tweet", quoted_id, "quote_tweet_id"))
            })?;
            quoted.quotes.insert(id.clone());
            referenced.push(TweetReference {
                ref_type: RefType::Quoted,
                id: quoted_id.clone(),
            });
        }

        let tweet = Tweet {
            id: id.clone(),
            author_id: author_id.to_string(),
            text: draft.text,
            created_at: Utc::now(),
            edit_history_tweet_ids: vec![id.clone()],
            conversation_id,
            in_reply_to_user_id,
            referenced_tweets: referenced,
            attachments_media_keys: draft.media_keys,
            attachments_poll_ids: Vec::new(),
            lang: "en".to_string(),
            source: "Mockingbird".to_string(),
            reply_settings: draft
                .reply_settings
                .unwrap_or_else(|| "everyone".to_string()),
            possibly_sensitive: false,
            liked_by: BTreeSet::new(),
            retweeted_by: BTreeSet::new(),
            bookmarked_by: BTreeSet::new(),
            replies: BTreeSet::new(),
            quotes: BTreeSet::new(),
        };

        inner
            .users
            .get_mut(author_id)
            .unwrap()
            .tweets
            .insert(id.clone());
        inner.tweets.insert(id, tweet.clone());
        Ok(tweet)
    }

    /// Deletes a tweet. `Ok(false)` when it never existed (idempotent);
    /// a 403 when the actor is not the author.
    pub fn delete_tweet(&self, id: &str, actor: &str) -> Result<bool> {
        let mut inner = self.write();
        let tweet = match inner.tweets.get(id) {
            Some(tweet) => tweet.clone(),
            None => return Ok(false),
        };
        if tweet.author_id != actor {
            return Err(Error::not_tweet_author());
        }

        inner.tweets.remove(id);

        // repair every mirror that pointed at the dead tweet
        for user in inner.users.values_mut() {
            user.tweets.remove(id);
            user.liked_tweets.remove(id);
            user.retweeted_tweets.remove(id);
            user.bookmarked_tweets.remove(id);
            if user.pinned_tweet_id.as_deref() == Some(id) {
                user.pinned_tweet_id = None;
            }
        }
        for reference in &tweet.referenced_tweets {
            if let Some(parent) = inner.tweets.get_mut(&reference.id) {
                match reference.ref_type {
                    RefType::RepliedTo => {
                        parent.replies.remove(id);
                    }
                    RefType::Quoted => {
                        parent.quotes.remove(id);
                    }
                    RefType::Retweeted => {}
                }
            }
        }
        Ok(true)
    }

    pub fn get_tweet(&self, id: &str) -> Option<Tweet> {
        self.read().tweets.get(id).cloned()
    }

    /// Bulk lookup preserving request order, with the missing ids second.
    pub fn get_tweets(&self, ids: &[String]) -> (Vec<Tweet>, Vec<String>) {
        let inner = self.read();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match inner.tweets.get(id) {
                Some(tweet) => found.push(tweet.clone()),
                None => missing.push(id.clone()),
            }
        }
        (found, missing)
    }

    pub fn like_tweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.engage(user_id, tweet_id, |u| &mut u.liked_tweets, |t| &mut t.liked_by, true)
    }

    pub fn unlike_tweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.engage(user_id, tweet_id, |u| &mut u.liked_tweets, |t| &mut t.liked_by, false)
    }

    pub fn retweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.engage(
            user_id,
            tweet_id,
            |u| &mut u.retweeted_tweets,
            |t| &mut t.retweeted_by,
            true,
        )
    }

    pub fn unretweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.engage(
            user_id,
            tweet_id,
            |u| &mut u.retweeted_tweets,
            |t| &mut t.retweeted_by,
            false,
        )
    }

    pub fn bookmark_tweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.engage(
            user_id,
            tweet_id,
            |u| &mut u.bookmarked_tweets,
            |t| &mut t.bookmarked_by,
            true,
        )
    }

    pub fn unbookmark_tweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.engage(
            user_id,
            tweet_id,
            |u| &mut u.bookmarked_tweets,
            |t| &mut t.bookmarked_by,
            false,
        )
    }

    fn engage(
        &self,
        user_id: &str,
        tweet_id: &str,
        user_set: impl Fn(&mut User) -> &mut BTreeSet<String>,
        tweet_set: impl Fn(&mut Tweet) -> &mut BTreeSet<String>,
        add: bool,
    ) -> Result<()> {
        let mut inner = self.write();
        if !inner.users.contains_key(user_id) {
            return Err(Error::NotFound(ResourceError::new("user", user_id, "id")));
        }
        if !inner.tweets.contains_key(tweet_id) {
            if add {
                return Err(Error::NotFound(ResourceError::new(
                    "tweet", tweet_id, "tweet_id",
                )));
            }
            // removing an engagement from a tweet that is gone is a no-op
            user_set(inner.users.get_mut(user_id).unwrap()).remove(tweet_id);
            return Ok(());
        }
        if add {
            user_set(inner.users.get_mut(user_id).unwrap()).insert(tweet_id.to_string());
            tweet_set(inner.tweets.get_mut(tweet_id).unwrap()).insert(user_id.to_string());
        } else {
            user_set(inner.users.get_mut(user_id).unwrap()).remove(tweet_id);
            tweet_set(inner.tweets.get_mut(tweet_id).unwrap()).remove(user_id);
        }
        Ok(())
    }

    /// Tweets the user has liked, newest-first.
    pub fn liked_tweets_of(&self, user_id: &str) -> Result<Vec<Tweet>> {
        self.resolve_tweet_set(user_id, |u| u.liked_tweets.clone())
    }

    /// Tweets the user has bookmarked, newest-first.
    pub fn bookmarks_of(&self, user_id: &str) -> Result<Vec<Tweet>> {
        self.resolve_tweet_set(user_id, |u| u.bookmarked_tweets.clone())
    }

    fn resolve_tweet_set(
        &self,
        user_id: &str,
        pick: impl Fn(&User) -> BTreeSet<String>,
    ) -> Result<Vec<Tweet>> {
        let inner = self.read();
        let user = inner
            .users
            .get(user_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", user_id, "id")))?;
        let mut tweets: Vec<Tweet> = pick(user)
            .iter()
            .filter_map(|id| inner.tweets.get(id).cloned())
            .collect();
        tweets.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        Ok(tweets)
    }

    /// Users who liked the tweet.
    pub fn liking_users(&self, tweet_id: &str) -> Result<Vec<User>> {
        self.resolve_engagers(tweet_id, |t| t.liked_by.clone())
    }

    /// Users who retweeted the tweet.
    pub fn retweeted_by_users(&self, tweet_id: &str) -> Result<Vec<User>> {
        self.resolve_engagers(tweet_id, |t| t.retweeted_by.clone())
    }

    fn resolve_engagers(
        &self,
        tweet_id: &str,
        pick: impl Fn(&Tweet) -> BTreeSet<String>,
    ) -> Result<Vec<User>> {
        let inner = self.read();
        let tweet = inner
            .tweets
            .get(tweet_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("tweet", tweet_id, "id")))?;
        Ok(pick(tweet)
            .iter()
            .filter_map(|id| inner.users.get(id).cloned())
            .collect())
    }

    /// Tweets quoting the given tweet, newest-first.
    pub fn quote_tweets_of(&self, tweet_id: &str) -> Result<Vec<Tweet>> {
        let inner = self.read();
        let tweet = inner
            .tweets
            .get(tweet_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("tweet", tweet_id, "id")))?;
        let mut quotes: Vec<Tweet> = tweet
            .quotes
            .iter()
            .filter_map(|id| inner.tweets.get(id).cloned())
            .collect();
        quotes.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        Ok(quotes)
    }

    /// The user's own tweets, newest-first.
    pub fn user_tweets(&self, user_id: &str) -> Result<Vec<Tweet>> {
        self.resolve_tweet_set(user_id, |u| u.tweets.clone())
    }

    /// Tweets that mention the user by handle or reply to them.
    pub fn user_mentions(&self, cancel: &Cancel, user_id: &str) -> Result<Vec<Tweet>> {
        let inner = self.read();
        let user = inner
            .users
            .get(user_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", user_id, "id")))?;
        let handle = format!("@{}", user.username).to_lowercase();
        let mut hits = Vec::new();
        for (i, tweet) in inner.tweets.values().enumerate() {
            if i % SCAN_STRIDE == 0 && cancel.cancelled() {
                break;
            }
            let mentioned = tweet.text.to_lowercase().contains(&handle)
                || tweet.in_reply_to_user_id.as_deref() == Some(user_id);
            if mentioned {
                hits.push(tweet.clone());
            }
        }
        hits.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        Ok(hits)
    }

    /// The reverse-chronological home timeline: own tweets plus everyone
    /// the user follows.
    pub fn home_timeline(&self, user_id: &str) -> Result<Vec<Tweet>> {
        let inner = self.read();
        let user = inner
            .users
            .get(user_id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("user", user_id, "id")))?;
        let mut tweets: Vec<Tweet> = inner
            .tweets
            .values()
            .filter(|t| t.author_id == user_id || user.following.contains(&t.author_id))
            .cloned()
            .collect();
        tweets.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        Ok(tweets)
    }

    /// Full-text search with id and time bounds, newest-first.
    #[allow(clippy::too_many_arguments)]
    pub fn search_tweets(
        &self,
        cancel: &Cancel,
        query: &str,
        limit: usize,
        since_id: Option<&str>,
        until_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<Tweet> {
        let needle = query.to_lowercase();
        let inner = self.read();
        let mut hits = Vec::new();
        // walk newest-first so the limit keeps the newest page
        for (i, tweet) in inner.tweets.values().rev().enumerate() {
            if i % SCAN_STRIDE == 0 && cancel.cancelled() {
                break;
            }
            if !tweet.text.to_lowercase().contains(&needle) {
                continue;
            }
            if let Some(since) = since_id {
                if cmp_ids(&tweet.id, since) != std::cmp::Ordering::Greater {
                    continue;
                }
            }
            if let Some(until) = until_id {
                if cmp_ids(&tweet.id, until) != std::cmp::Ordering::Less {
                    continue;
                }
            }
            if let Some(start) = start {
                if tweet.created_at < start {
                    continue;
                }
            }
            if let Some(end) = end {
                if tweet.created_at >= end {
                    continue;
                }
            }
            hits.push(tweet.clone());
            if hits.len() >= limit {
                break;
            }
        }
        hits.sort_by(|a, b| cmp_ids(&b.id, &a.id));
        hits
    }

    /// Count of matching tweets, for the counts endpoint.
    pub fn count_tweets(&self, cancel: &Cancel, query: &str) -> usize {
        let needle = query.to_lowercase();
        let inner = self.read();
        let mut count = 0;
        for (i, tweet) in inner.tweets.values().enumerate() {
            if i % SCAN_STRIDE == 0 && cancel.cancelled() {
                break;
            }
            if tweet.text.to_lowercase().contains(&needle) {
                count += 1;
            }
        }
        count
    }

    /// The newest tweets, for the sample and firehose streams.
    pub fn recent_tweets(&self, limit: usize) -> Vec<Tweet> {
        let inner = self.read();
        inner.tweets.values().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_tweet_is_fetchable_and_indexed() {
        let store = Store::seeded();
        let tweet = store.create_tweet(TweetDraft::new("hi"), "0").unwrap();

        assert_eq!(tweet.text, "hi");
        assert_eq!(tweet.edit_history_tweet_ids, vec![tweet.id.clone()]);
        assert_eq!(tweet.conversation_id, tweet.id);

        let fetched = store.get_tweet(&tweet.id).unwrap();
        assert_eq!(fetched.text, "hi");
        assert!(store.get_user("0").unwrap().tweets.contains(&tweet.id));
    }

    #[test]
    fn replies_and_quotes_wire_both_directions() {
        let store = Store::seeded();
        let root = store.create_tweet(TweetDraft::new("root"), "1").unwrap();

        let mut draft = TweetDraft::new("a reply");
        draft.in_reply_to_tweet_id = Some(root.id.clone());
        let reply = store.create_tweet(draft, "2").unwrap();
        assert_eq!(reply.in_reply_to_user_id.as_deref(), Some("1"));
        assert_eq!(reply.conversation_id, root.id);
        assert!(store.get_tweet(&root.id).unwrap().replies.contains(&reply.id));

        let mut draft = TweetDraft::new("quoting this");
        draft.quote_tweet_id = Some(root.id.clone());
        let quote = store.create_tweet(draft, "3").unwrap();
        assert_eq!(store.quote_tweets_of(&root.id).unwrap()[0].id, quote.id);
    }

    #[test]
    fn delete_requires_the_author() {
        let store = Store::seeded();
        let tweet = store.create_tweet(TweetDraft::new("mine"), "1").unwrap();

        match store.delete_tweet(&tweet.id, "2") {
            Err(Error::Forbidden { .. }) => {}
            other => panic!("expected Forbidden, got {:?}", other),
        }
        assert_eq!(store.delete_tweet(&tweet.id, "1").unwrap(), true);
        assert_eq!(store.delete_tweet(&tweet.id, "1").unwrap(), false);
    }

    #[test]
    fn delete_repairs_every_mirror() {
        let store = Store::seeded();
        let tweet = store.create_tweet(TweetDraft::new("popular"), "1").unwrap();
        store.like_tweet("2", &tweet.id).unwrap();
        store.retweet("3", &tweet.id).unwrap();
        store.bookmark_tweet("2", &tweet.id).unwrap();

        store.delete_tweet(&tweet.id, "1").unwrap();
        let two = store.get_user("2").unwrap();
        let three = store.get_user("3").unwrap();
        assert!(!two.liked_tweets.contains(&tweet.id));
        assert!(!two.bookmarked_tweets.contains(&tweet.id));
        assert!(!three.retweeted_tweets.contains(&tweet.id));
    }

    #[test]
    fn engagement_is_mirrored_and_idempotent() {
        let store = Store::seeded();
        let tweet = store.create_tweet(TweetDraft::new("like me"), "1").unwrap();

        store.like_tweet("2", &tweet.id).unwrap();
        store.like_tweet("2", &tweet.id).unwrap();
        assert_eq!(store.get_tweet(&tweet.id).unwrap().liked_by.len(), 1);
        assert_eq!(store.liked_tweets_of("2").unwrap().len(), 1);

        store.unlike_tweet("2", &tweet.id).unwrap();
        store.unlike_tweet("2", &tweet.id).unwrap();
        assert!(store.get_tweet(&tweet.id).unwrap().liked_by.is_empty());
        assert!(store.liked_tweets_of("2").unwrap().is_empty());
    }

    #[test]
    fn unlike_of_a_dead_tweet_is_a_soft_no_op() {
        let store = Store::seeded();
        assert!(store.unlike_tweet("2", "424242").is_ok());
        match store.like_tweet("2", "424242") {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn search_filters_by_id_and_time_bounds() {
        let store = Store::seeded();
        let early = store.create_tweet(TweetDraft::new("needle one"), "1").unwrap();
        let late = store.create_tweet(TweetDraft::new("needle two"), "2").unwrap();

        let all = store.search_tweets(&Cancel::never(), "needle", 10, None, None, None, None);
        assert_eq!(all.len(), 2);
        // newest-first
        assert_eq!(all[0].id, late.id);

        let after = store.search_tweets(
            &Cancel::never(),
            "needle",
            10,
            Some(early.id.as_str()),
            None,
            None,
            None,
        );
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, late.id);

        let before = store.search_tweets(
            &Cancel::never(),
            "needle",
            10,
            None,
            Some(late.id.as_str()),
            None,
            None,
        );
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, early.id);
    }

    #[test]
    fn mentions_catch_handles_and_replies() {
        let store = Store::seeded();
        store
            .create_tweet(TweetDraft::new("paging @wren about nests"), "1")
            .unwrap();
        let mentions = store.user_mentions(&Cancel::never(), "2").unwrap();
        assert!(mentions.iter().any(|t| t.text.contains("paging")));
    }

    #[test]
    fn home_timeline_is_follows_plus_self() {
        let store = Store::seeded();
        store.follow_user("0", "1").unwrap();
        let own = store.create_tweet(TweetDraft::new("my own"), "0").unwrap();
        let followed = store.create_tweet(TweetDraft::new("robin again"), "1").unwrap();
        let stranger = store.create_tweet(TweetDraft::new("finch thought"), "3").unwrap();

        let timeline = store.home_timeline("0").unwrap();
        let ids: Vec<&str> = timeline.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&own.id.as_str()));
        assert!(ids.contains(&followed.id.as_str()));
        assert!(!ids.contains(&stranger.id.as_str()));
    }

    #[test]
    fn entities_spans_are_codepoint_offsets() {
        let map = Tweet {
            id: "1".into(),
            author_id: "1".into(),
            text: "héllo #Rust from @robin".into(),
            created_at: Utc::now(),
            edit_history_tweet_ids: vec!["1".into()],
            conversation_id: "1".into(),
            in_reply_to_user_id: None,
            referenced_tweets: Vec::new(),
            attachments_media_keys: Vec::new(),
            attachments_poll_ids: Vec::new(),
            lang: "en".into(),
            source: "test".into(),
            reply_settings: "everyone".into(),
            possibly_sensitive: false,
            liked_by: BTreeSet::new(),
            retweeted_by: BTreeSet::new(),
            bookmarked_by: BTreeSet::new(),
            replies: BTreeSet::new(),
            quotes: BTreeSet::new(),
        }
        .wire();

        let entities = &map["entities"];
        assert_eq!(entities["hashtags"][0]["tag"], "Rust");
        assert_eq!(entities["hashtags"][0]["start"], 6);
        assert_eq!(entities["mentions"][0]["username"], "robin");
    }

    #[test]
    fn id_ordering_is_numeric() {
        assert_eq!(cmp_ids("9", "10"), std::cmp::Ordering::Less);
        assert_eq!(cmp_ids("100", "99"), std::cmp::Ordering::Greater);
        assert_eq!(cmp_ids("42", "42"), std::cmp::Ordering::Equal);
    }
}

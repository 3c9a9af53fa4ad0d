// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tweet endpoints: lookup, creation, deletion, search, counts, and the
//! engagement views.

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::error::{Error, ResourceError, Result};
use crate::shape::{Outcome, Payload};
use crate::store::TweetDraft;

use super::Ctx;

pub fn lookup(ctx: &Ctx<'_>) -> Result<Outcome> {
    let ids = ctx.query.get_list("ids");
    let (found, missing) = ctx.store.get_tweets(&ids);
    let errors = missing
        .iter()
        .map(|id| ResourceError::new("tweet", id, "ids").to_value())
        .collect();
    Ok(Outcome::ok(Payload::Tweets(found)).with_errors(errors))
}

pub fn create(ctx: &Ctx<'_>) -> Result<Outcome> {
    let author = ctx.account()?;
    let mut draft = TweetDraft::new(ctx.body_str("text")?);
    draft.quote_tweet_id = ctx.body_opt("quote_tweet_id").map(String::from);
    draft.reply_settings = ctx.body_opt("reply_settings").map(String::from);
    if let Some(reply) = ctx.body.and_then(|b| b.get("reply")) {
        draft.in_reply_to_tweet_id = reply
            .get("in_reply_to_tweet_id")
            .and_then(|v| v.as_str())
            .map(String::from);
    }
    if let Some(media) = ctx.body.and_then(|b| b.get("media")) {
        if let Some(ids) = media.get("media_ids").and_then(|v| v.as_array()) {
            // clients send upload ids; tweets carry media keys
            draft.media_keys = ids
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|id| {
                    ctx.store
                        .get_media(id)
                        .or_else(|| ctx.store.get_media_by_key(id))
                        .map(|m| m.media_key)
                })
                .collect();
        }
    }

    let tweet = ctx.store.create_tweet(draft, &author)?;
    Ok(Outcome::created(Payload::Tweet(tweet)))
}

pub fn show(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    match ctx.store.get_tweet(id) {
        Some(tweet) => Ok(Outcome::ok(Payload::Tweet(tweet))),
        None => Ok(Outcome::ok(Payload::Empty)
            .with_errors(vec![ResourceError::new("tweet", id, "id").to_value()])),
    }
}

pub fn delete(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let deleted = ctx.store.delete_tweet(id, ctx.actor)?;
    if !deleted {
        // deleting the resource itself is the hard variant of not-found
        return Err(Error::NotFound(ResourceError::new("tweet", id, "id")));
    }
    Ok(Outcome::raw(json!({ "deleted": true })))
}

pub fn search(ctx: &Ctx<'_>) -> Result<Outcome> {
    let query = ctx.query.get("query").unwrap_or_default();
    let hits = ctx.store.search_tweets(
        ctx.cancel,
        query,
        usize::MAX,
        ctx.query.since_id.as_deref(),
        ctx.query.until_id.as_deref(),
        ctx.query.start_time,
        ctx.query.end_time,
    );
    let (page, mut meta) = ctx.paginate(hits);
    meta.newest_id = page.first().map(|t| t.id.clone());
    meta.oldest_id = page.last().map(|t| t.id.clone());
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

pub fn counts(ctx: &Ctx<'_>) -> Result<Outcome> {
    let query = ctx.query.get("query").unwrap_or_default();
    let count = ctx.store.count_tweets(ctx.cancel, query);
    let now = Utc::now();
    let start = ctx
        .query
        .start_time
        .unwrap_or_else(|| now - chrono::Duration::days(7));
    let end = ctx.query.end_time.unwrap_or(now);

    let mut meta = crate::common::envelope::Meta::default();
    meta.extra
        .insert("total_tweet_count".into(), json!(count));
    Ok(Outcome::raw(json!([{
        "start": start.to_rfc3339_opts(SecondsFormat::Millis, true),
        "end": end.to_rfc3339_opts(SecondsFormat::Millis, true),
        "tweet_count": count,
    }]))
    .with_meta(meta))
}

pub fn liking_users(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.liking_users(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn retweeted_by(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.retweeted_by_users(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn quote_tweets(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.quote_tweets_of(id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! User endpoints: lookup, search, the relationship graph, engagement,
//! and timelines.
//!
//! Lookup misses follow the X-API convention of a 200 whose `errors`
//! array carries the `Not Found Error` objects; only mutations against
//! missing targets surface as real 404s.

use serde_json::json;

use crate::error::{Error, ResourceError, Result};
use crate::shape::{Outcome, Payload};

use super::Ctx;

pub fn me(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.account()?;
    let user = ctx
        .store
        .get_user(&id)
        .ok_or_else(|| Error::Internal("developer account vanished after creation".to_string()))?;
    Ok(Outcome::ok(Payload::User(user)))
}

pub fn lookup(ctx: &Ctx<'_>) -> Result<Outcome> {
    let ids = ctx.query.get_list("ids");
    let (found, missing) = ctx.store.get_users(&ids);
    let errors = missing
        .iter()
        .map(|id| ResourceError::new("user", id, "ids").to_value())
        .collect();
    Ok(Outcome::ok(Payload::Users(found)).with_errors(errors))
}

pub fn by_usernames(ctx: &Ctx<'_>) -> Result<Outcome> {
    let usernames = ctx.query.get_list("usernames");
    let (found, missing) = ctx.store.get_users_by_usernames(&usernames);
    let errors = missing
        .iter()
        .map(|username| ResourceError::new("user", username, "usernames").to_value())
        .collect();
    Ok(Outcome::ok(Payload::Users(found)).with_errors(errors))
}

pub fn by_username(ctx: &Ctx<'_>) -> Result<Outcome> {
    let username = ctx.path("username")?;
    match ctx.store.get_user_by_username(username) {
        Some(user) => Ok(Outcome::ok(Payload::User(user))),
        None => Ok(Outcome::ok(Payload::Empty).with_errors(vec![
            ResourceError::new("user", username, "username").to_value(),
        ])),
    }
}

pub fn show(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    match ctx.store.get_user(id) {
        Some(user) => Ok(Outcome::ok(Payload::User(user))),
        None => Ok(Outcome::ok(Payload::Empty)
            .with_errors(vec![ResourceError::new("user", id, "id").to_value()])),
    }
}

pub fn search(ctx: &Ctx<'_>) -> Result<Outcome> {
    let query = ctx.query.get("query").unwrap_or_default();
    let hits = ctx.store.search_users(ctx.cancel, query, 1000);
    let (page, meta) = ctx.paginate(hits);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn following(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.following_of(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn follow(ctx: &Ctx<'_>) -> Result<Outcome> {
    let source = ctx.path("id")?;
    let target = ctx.body_str("target_user_id")?;
    ctx.store.follow_user(source, target)?;
    Ok(Outcome::raw(json!({
        "following": true,
        "pending_follow": false,
    })))
}

pub fn unfollow(ctx: &Ctx<'_>) -> Result<Outcome> {
    let source = ctx.path("source_user_id")?;
    let target = ctx.path("target_user_id")?;
    ctx.store.unfollow_user(source, target)?;
    Ok(Outcome::raw(json!({ "following": false })))
}

pub fn followers(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.followers_of(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn blocking(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.blocking_of(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn block(ctx: &Ctx<'_>) -> Result<Outcome> {
    let source = ctx.path("id")?;
    let target = ctx.body_str("target_user_id")?;
    ctx.store.block_user(source, target)?;
    Ok(Outcome::raw(json!({ "blocking": true })))
}

pub fn unblock(ctx: &Ctx<'_>) -> Result<Outcome> {
    let source = ctx.path("source_user_id")?;
    let target = ctx.path("target_user_id")?;
    ctx.store.unblock_user(source, target)?;
    Ok(Outcome::raw(json!({ "blocking": false })))
}

pub fn muting(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.muting_of(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn mute(ctx: &Ctx<'_>) -> Result<Outcome> {
    let source = ctx.path("id")?;
    let target = ctx.body_str("target_user_id")?;
    ctx.store.mute_user(source, target)?;
    Ok(Outcome::raw(json!({ "muting": true })))
}

pub fn unmute(ctx: &Ctx<'_>) -> Result<Outcome> {
    let source = ctx.path("source_user_id")?;
    let target = ctx.path("target_user_id")?;
    ctx.store.unmute_user(source, target)?;
    Ok(Outcome::raw(json!({ "muting": false })))
}

pub fn bookmarks(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.bookmarks_of(id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

pub fn bookmark(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let tweet_id = ctx.body_str("tweet_id")?;
    ctx.store.bookmark_tweet(id, tweet_id)?;
    Ok(Outcome::raw(json!({ "bookmarked": true })))
}

pub fn unbookmark(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let tweet_id = ctx.path("tweet_id")?;
    ctx.store.unbookmark_tweet(id, tweet_id)?;
    Ok(Outcome::raw(json!({ "bookmarked": false })))
}

pub fn liked_tweets(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.liked_tweets_of(id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

pub fn like(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let tweet_id = ctx.body_str("tweet_id")?;
    ctx.store.like_tweet(id, tweet_id)?;
    Ok(Outcome::raw(json!({ "liked": true })))
}

pub fn unlike(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let tweet_id = ctx.path("tweet_id")?;
    ctx.store.unlike_tweet(id, tweet_id)?;
    Ok(Outcome::raw(json!({ "liked": false })))
}

pub fn retweet(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let tweet_id = ctx.body_str("tweet_id")?;
    ctx.store.retweet(id, tweet_id)?;
    Ok(Outcome::raw(json!({ "retweeted": true })))
}

pub fn unretweet(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let tweet_id = ctx.path("source_tweet_id")?;
    ctx.store.unretweet(id, tweet_id)?;
    Ok(Outcome::raw(json!({ "retweeted": false })))
}

pub fn tweets(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.user_tweets(id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

pub fn mentions(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.user_mentions(ctx.cancel, id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

pub fn home_timeline(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.home_timeline(id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! List endpoints: CRUD, membership, pinning, and following.

use serde_json::json;

use crate::error::{Error, ResourceError, Result};
use crate::shape::{Outcome, Payload};

use super::Ctx;

pub fn create(ctx: &Ctx<'_>) -> Result<Outcome> {
    let owner = ctx.account()?;
    let name = ctx.body_str("name")?;
    let description = ctx.body_opt("description").unwrap_or_default();
    let private = ctx
        .body
        .and_then(|b| b.get("private"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let list = ctx.store.create_list(&owner, name, description, private)?;
    Ok(Outcome::created(Payload::List(list)))
}

pub fn show(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    match ctx.store.get_list(id) {
        Some(list) => Ok(Outcome::ok(Payload::List(list))),
        None => Ok(Outcome::ok(Payload::Empty)
            .with_errors(vec![ResourceError::new("list", id, "id").to_value()])),
    }
}

pub fn update(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let private = ctx
        .body
        .and_then(|b| b.get("private"))
        .and_then(|v| v.as_bool());
    ctx.store.update_list(
        id,
        ctx.actor,
        ctx.body_opt("name"),
        ctx.body_opt("description"),
        private,
    )?;
    Ok(Outcome::raw(json!({ "updated": true })))
}

pub fn delete(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let deleted = ctx.store.delete_list(id, ctx.actor)?;
    if !deleted {
        return Err(Error::NotFound(ResourceError::new("list", id, "id")));
    }
    Ok(Outcome::raw(json!({ "deleted": true })))
}

pub fn members(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.list_members(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn add_member(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let user_id = ctx.body_str("user_id")?;
    ctx.store.add_list_member(id, ctx.actor, user_id)?;
    Ok(Outcome::raw(json!({ "is_member": true })))
}

pub fn remove_member(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let user_id = ctx.path("user_id")?;
    ctx.store.remove_list_member(id, ctx.actor, user_id)?;
    Ok(Outcome::raw(json!({ "is_member": false })))
}

pub fn tweets(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.list_tweets(id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

pub fn followers(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.list_followers(id)?);
    Ok(Outcome::ok(Payload::Users(page)).with_meta(meta))
}

pub fn pinned(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.pinned_lists_of(id)?);
    Ok(Outcome::ok(Payload::Lists(page)).with_meta(meta))
}

pub fn pin(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let list_id = ctx.body_str("list_id")?;
    ctx.store.pin_list(id, list_id)?;
    Ok(Outcome::raw(json!({ "pinned": true })))
}

pub fn unpin(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let list_id = ctx.path("list_id")?;
    ctx.store.unpin_list(id, list_id)?;
    Ok(Outcome::raw(json!({ "pinned": false })))
}

pub fn owned(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.owned_lists_of(id)?);
    Ok(Outcome::ok(Payload::Lists(page)).with_meta(meta))
}

pub fn followed(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.followed_lists_of(id)?);
    Ok(Outcome::ok(Payload::Lists(page)).with_meta(meta))
}

pub fn follow(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let list_id = ctx.body_str("list_id")?;
    ctx.store.follow_list(id, list_id)?;
    Ok(Outcome::raw(json!({ "following": true })))
}

pub fn unfollow(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let list_id = ctx.path("list_id")?;
    ctx.store.unfollow_list(id, list_id)?;
    Ok(Outcome::raw(json!({ "following": false })))
}

pub fn memberships(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.list_memberships_of(id)?);
    Ok(Outcome::ok(Payload::Lists(page)).with_meta(meta))
}

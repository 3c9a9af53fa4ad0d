// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Space endpoints: lookup, creator lookup, search, shared tweets.

use crate::error::{ResourceError, Result};
use crate::shape::{Outcome, Payload};

use super::Ctx;

pub fn lookup(ctx: &Ctx<'_>) -> Result<Outcome> {
    let ids = ctx.query.get_list("ids");
    let (found, missing) = ctx.store.get_spaces(&ids);
    let errors = missing
        .iter()
        .map(|id| ResourceError::new("space", id, "ids").to_value())
        .collect();
    Ok(Outcome::ok(Payload::Spaces(found)).with_errors(errors))
}

pub fn show(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    match ctx.store.get_space(id) {
        Some(space) => Ok(Outcome::ok(Payload::Space(space))),
        None => Ok(Outcome::ok(Payload::Empty)
            .with_errors(vec![ResourceError::new("space", id, "id").to_value()])),
    }
}

pub fn search(ctx: &Ctx<'_>) -> Result<Outcome> {
    let query = ctx.query.get("query").unwrap_or_default();
    let state = ctx.query.get("state");
    let hits = ctx.store.search_spaces(ctx.cancel, query, state);
    let (page, meta) = ctx.paginate(hits);
    Ok(Outcome::ok(Payload::Spaces(page)).with_meta(meta))
}

pub fn by_creators(ctx: &Ctx<'_>) -> Result<Outcome> {
    let creators = ctx.query.get_list("user_ids");
    let spaces = ctx.store.spaces_by_creators(&creators);
    let (page, meta) = ctx.paginate(spaces);
    Ok(Outcome::ok(Payload::Spaces(page)).with_meta(meta))
}

pub fn tweets(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    let (page, meta) = ctx.paginate(ctx.store.space_tweets(id)?);
    Ok(Outcome::ok(Payload::Tweets(page)).with_meta(meta))
}

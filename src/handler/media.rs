// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Media upload endpoints: the INIT / APPEND / FINALIZE command flow on
//! POST and the STATUS poll on GET.

use crate::error::{Error, Result, ValidationError, ValidationErrors};
use crate::shape::{Outcome, Payload};

use super::Ctx;

/// `POST /2/media/upload?command=INIT|APPEND|FINALIZE`. A POST without a
/// command but with a `media_type` is treated as INIT, which is what the
/// simple one-shot clients send.
pub fn upload(ctx: &Ctx<'_>) -> Result<Outcome> {
    let command = ctx
        .query
        .get("command")
        .map(str::to_ascii_uppercase)
        .or_else(|| ctx.body_opt("command").map(str::to_ascii_uppercase))
        .unwrap_or_else(|| "INIT".to_string());

    match command.as_str() {
        "INIT" => {
            let media_type = ctx
                .query
                .get("media_type")
                .or_else(|| ctx.body_opt("media_type"))
                .unwrap_or("image/png");
            let total_bytes = ctx
                .query
                .get("total_bytes")
                .or_else(|| ctx.body_opt("total_bytes"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let media = ctx.store.create_media(media_type, total_bytes);
            Ok(Outcome::created(Payload::MediaItem(media)))
        }
        "APPEND" => {
            let id = media_id(ctx)?;
            let chunk = ctx
                .query
                .get("segment_bytes")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            ctx.store.append_media(&id, chunk)?;
            let media = ctx
                .store
                .get_media(&id)
                .ok_or_else(|| Error::Internal("media vanished mid-append".to_string()))?;
            Ok(Outcome::ok(Payload::MediaItem(media)))
        }
        "FINALIZE" => {
            let id = media_id(ctx)?;
            let media = ctx.store.finalize_media(&id)?;
            Ok(Outcome::ok(Payload::MediaItem(media)))
        }
        other => {
            let mut batch = ValidationErrors::default();
            batch.push(ValidationError::new(
                "command",
                vec![other.to_string()],
                format!(
                    "The `command` query parameter value [{}] is not one of [INIT,APPEND,FINALIZE,STATUS]",
                    other
                ),
            ));
            Err(Error::Validation(batch))
        }
    }
}

/// `GET /2/media/upload?command=STATUS&media_id=...` — each poll advances
/// a processing video toward `succeeded`.
pub fn status(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = media_id(ctx)?;
    let media = ctx.store.media_status(&id)?;
    Ok(Outcome::ok(Payload::MediaItem(media)))
}

fn media_id(ctx: &Ctx<'_>) -> Result<String> {
    ctx.query
        .get("media_id")
        .map(String::from)
        .or_else(|| ctx.body_opt("media_id").map(String::from))
        .ok_or_else(|| {
            let mut batch = ValidationErrors::default();
            batch.push(ValidationError::new(
                "media_id",
                Vec::new(),
                "The `media_id` query parameter can not be empty".to_string(),
            ));
            Error::Validation(batch)
        })
}

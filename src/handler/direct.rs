// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Direct-message endpoints.

use serde_json::json;

use crate::error::{Result, ValidationError, ValidationErrors};
use crate::shape::{Outcome, Payload};

use super::Ctx;

/// `POST /2/dm_conversations` — a group conversation with an opening
/// message.
pub fn create_conversation(ctx: &Ctx<'_>) -> Result<Outcome> {
    let creator = ctx.account()?;
    let participants: Vec<String> = ctx
        .body
        .and_then(|b| b.get("participant_ids"))
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    if participants.is_empty() {
        let mut batch = ValidationErrors::default();
        batch.push(ValidationError::new(
            "participant_ids",
            Vec::new(),
            "The `participant_ids` field is required".to_string(),
        ));
        return Err(crate::error::Error::Validation(batch));
    }
    let text = message_text(ctx)?;
    let event = ctx
        .store
        .create_group_conversation(&creator, &participants, &text)?;
    Ok(Outcome::created(Payload::Raw(json!({
        "dm_conversation_id": event.dm_conversation_id,
        "dm_event_id": event.id,
    }))))
}

/// `POST /2/dm_conversations/with/{participant_id}/messages`.
pub fn send_to_participant(ctx: &Ctx<'_>) -> Result<Outcome> {
    let sender = ctx.account()?;
    let participant = ctx.path("participant_id")?;
    let text = message_text(ctx)?;
    let event = ctx
        .store
        .send_dm_to_participant(&sender, participant, &text)?;
    Ok(Outcome::created(Payload::Raw(json!({
        "dm_conversation_id": event.dm_conversation_id,
        "dm_event_id": event.id,
    }))))
}

/// `POST /2/dm_conversations/{dm_conversation_id}/messages`.
pub fn send_to_conversation(ctx: &Ctx<'_>) -> Result<Outcome> {
    let sender = ctx.account()?;
    let conversation = ctx.path("dm_conversation_id")?;
    let text = message_text(ctx)?;
    let event = ctx
        .store
        .send_dm_to_conversation(&sender, conversation, &text)?;
    Ok(Outcome::created(Payload::Raw(json!({
        "dm_conversation_id": event.dm_conversation_id,
        "dm_event_id": event.id,
    }))))
}

/// `GET /2/dm_conversations/with/{participant_id}/dm_events`.
pub fn events_with(ctx: &Ctx<'_>) -> Result<Outcome> {
    let me = ctx.account()?;
    let participant = ctx.path("participant_id")?;
    let (page, meta) = ctx.paginate(ctx.store.dm_events_with(&me, participant));
    Ok(Outcome::ok(Payload::DmEvents(page)).with_meta(meta))
}

/// `GET /2/dm_events`.
pub fn events(ctx: &Ctx<'_>) -> Result<Outcome> {
    let (page, meta) = ctx.paginate(ctx.store.dm_events());
    Ok(Outcome::ok(Payload::DmEvents(page)).with_meta(meta))
}

/// The message text lives either at the top level or under `message`,
/// depending on the endpoint generation the client speaks.
fn message_text(ctx: &Ctx<'_>) -> Result<String> {
    if let Some(text) = ctx.body_opt("text") {
        return Ok(text.to_string());
    }
    if let Some(text) = ctx
        .body
        .and_then(|b| b.get("message"))
        .and_then(|m| m.get("text"))
        .and_then(|t| t.as_str())
    {
        return Ok(text.to_string());
    }
    let mut batch = ValidationErrors::default();
    batch.push(ValidationError::new(
        "text",
        Vec::new(),
        "The `text` field is required".to_string(),
    ));
    Err(crate::error::Error::Validation(batch))
}

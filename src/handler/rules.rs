// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Filtered-stream rule endpoints.

use serde_json::{json, Value};

use crate::common::envelope::Meta;
use crate::common::now_rfc3339;
use crate::error::{Error, Result, ValidationError, ValidationErrors};
use crate::shape::{Outcome, Payload};

use super::Ctx;

/// `GET /2/tweets/search/stream/rules`.
pub fn list(ctx: &Ctx<'_>) -> Result<Outcome> {
    let rules: Vec<Value> = ctx.store.stream_rules().iter().map(|r| r.wire()).collect();
    let mut meta = Meta::collection(rules.len());
    meta.extra.insert("sent".into(), json!(now_rfc3339()));
    Ok(Outcome::ok(Payload::Raw(Value::Array(rules))).with_meta(meta))
}

/// `POST /2/tweets/search/stream/rules` — an `add` or `delete` batch,
/// optionally `dry_run`.
pub fn mutate(ctx: &Ctx<'_>) -> Result<Outcome> {
    let body = ctx.body.ok_or_else(|| {
        let mut batch = ValidationErrors::default();
        batch.push(ValidationError::new(
            "body",
            Vec::new(),
            "The request body can not be empty".to_string(),
        ));
        Error::Validation(batch)
    })?;
    let dry_run = ctx.query.get("dry_run") == Some("true");

    if let Some(add) = body.get("add").and_then(|v| v.as_array()) {
        let entries: Vec<(String, Option<String>)> = add
            .iter()
            .filter_map(|entry| {
                entry.get("value").and_then(|v| v.as_str()).map(|value| {
                    (
                        value.to_string(),
                        entry.get("tag").and_then(|t| t.as_str()).map(String::from),
                    )
                })
            })
            .collect();
        let outcome = ctx.store.add_stream_rules(&entries, dry_run);

        let mut meta = Meta::default();
        meta.extra.insert("sent".into(), json!(now_rfc3339()));
        meta.extra.insert("summary".into(), outcome.summary(false));
        let data: Vec<Value> = outcome.created.iter().map(|r| r.wire()).collect();
        let status = if outcome.errors.is_empty() {
            hyper::StatusCode::CREATED
        } else {
            hyper::StatusCode::OK
        };
        let mut shaped = Outcome::ok(if data.is_empty() {
            Payload::Empty
        } else {
            Payload::Raw(Value::Array(data))
        })
        .with_errors(outcome.errors.clone())
        .with_meta(meta);
        shaped.status = status;
        return Ok(shaped);
    }

    if let Some(delete) = body.get("delete") {
        let ids: Vec<String> = delete
            .get("ids")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let values: Vec<String> = delete
            .get("values")
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let outcome = ctx.store.delete_stream_rules(&ids, &values);

        let mut meta = Meta::default();
        meta.extra.insert("sent".into(), json!(now_rfc3339()));
        meta.extra.insert("summary".into(), outcome.summary(true));
        return Ok(Outcome::ok(Payload::Empty).with_meta(meta));
    }

    let mut batch = ValidationErrors::default();
    batch.push(ValidationError::new(
        "add",
        Vec::new(),
        "The request body must contain either `add` or `delete`".to_string(),
    ));
    Err(Error::Validation(batch))
}

/// `GET /2/tweets/search/stream/rules/counts`.
pub fn counts(ctx: &Ctx<'_>) -> Result<Outcome> {
    Ok(Outcome::raw(ctx.store.rule_counts(ctx.actor)))
}

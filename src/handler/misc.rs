// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The smaller endpoint families: communities, trends, compliance jobs,
//! usage, and the connection kill switch.

use serde_json::json;

use crate::error::{ResourceError, Result};
use crate::shape::{Outcome, Payload};

use super::Ctx;

pub fn search_communities(ctx: &Ctx<'_>) -> Result<Outcome> {
    let query = ctx.query.get("query").unwrap_or_default();
    let hits = ctx.store.search_communities(ctx.cancel, query);
    let (page, meta) = ctx.paginate(hits);
    Ok(Outcome::ok(Payload::Communities(page)).with_meta(meta))
}

pub fn show_community(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    match ctx.store.get_community(id) {
        Some(community) => Ok(Outcome::ok(Payload::Community(community))),
        None => Ok(Outcome::ok(Payload::Empty)
            .with_errors(vec![ResourceError::new("community", id, "id").to_value()])),
    }
}

pub fn trends_by_woeid(ctx: &Ctx<'_>) -> Result<Outcome> {
    let woeid = ctx.path("woeid")?;
    let trends = woeid
        .parse()
        .ok()
        .and_then(|woeid| ctx.store.trends_for_woeid(woeid))
        .unwrap_or_default();
    Ok(Outcome::ok(Payload::Trends(trends)))
}

pub fn personalized_trends(ctx: &Ctx<'_>) -> Result<Outcome> {
    Ok(Outcome::ok(Payload::PersonalizedTrends(
        ctx.store.personalized_trends(),
    )))
}

pub fn create_compliance_job(ctx: &Ctx<'_>) -> Result<Outcome> {
    let job_type = ctx.body_str("type")?;
    let name = ctx.body_opt("name");
    let job = ctx.store.create_compliance_job(job_type, name);
    Ok(Outcome::created(Payload::ComplianceJob(job)))
}

pub fn compliance_jobs(ctx: &Ctx<'_>) -> Result<Outcome> {
    let job_type = ctx.query.get("type");
    let jobs = ctx.store.compliance_jobs(job_type);
    Ok(Outcome::ok(Payload::ComplianceJobs(jobs)))
}

pub fn show_compliance_job(ctx: &Ctx<'_>) -> Result<Outcome> {
    let id = ctx.path("id")?;
    match ctx.store.get_compliance_job(id) {
        Ok(job) => Ok(Outcome::ok(Payload::ComplianceJob(job))),
        Err(_) => Ok(Outcome::ok(Payload::Empty).with_errors(vec![
            ResourceError::new("compliance_job", id, "id").to_value(),
        ])),
    }
}

/// `GET /2/usage/tweets` — the credit samples the dispatcher records per
/// credential.
pub fn usage(ctx: &Ctx<'_>) -> Result<Outcome> {
    Ok(Outcome::raw(json!({
        "cap_reset_day": 1,
        "project_cap": "1000000",
        "project_id": ctx.actor,
        "project_usage": ctx.store.project_usage().to_string(),
    })))
}

/// `DELETE /2/connections/all` — always reports the attempt, even when
/// nothing was listening.
pub fn close_connections(ctx: &Ctx<'_>) -> Result<Outcome> {
    let closed = ctx.store.close_all_connections();
    tracing::debug!(closed, "bulk connection close requested");
    Ok(Outcome::raw(json!({ "attempted": true })))
}

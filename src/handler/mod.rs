// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-domain endpoint handlers and the table wiring matched
//! operations to them.
//!
//! Handlers are small: the validator has already run, so they parse the
//! pieces they need, call one or two store methods, and describe the
//! result as an [`Outcome`] for the response shaper. A handler never
//! writes headers and never sees the network.

pub mod direct;
pub mod lists;
pub mod media;
pub mod misc;
pub mod rules;
pub mod spaces;
pub mod tweets;
pub mod users;

use serde_json::Value;

use crate::common::{envelope::Meta, Cancel};
use crate::error::{Error, Result, ValidationError, ValidationErrors};
use crate::links;
use crate::query::{decode_cursor, encode_cursor, QueryParams};
use crate::shape::Outcome;
use crate::spec::{ApiSpec, ResolvedOperation};
use crate::store::Store;

/// Everything a handler may consult for one request.
pub struct Ctx<'a> {
    pub store: &'a Store,
    pub spec: &'a ApiSpec,
    pub resolved: &'a ResolvedOperation<'a>,
    pub query: &'a QueryParams,
    pub body: Option<&'a Value>,
    /// The credential fingerprint, acting as the caller's user id.
    pub actor: &'a str,
    pub cancel: &'a Cancel,
}

impl<'a> Ctx<'a> {
    /// A required path parameter; routing guarantees its presence.
    pub fn path(&self, name: &str) -> Result<&str> {
        self.resolved
            .path_param(name)
            .ok_or_else(|| Error::Internal(format!("path parameter {} missing after routing", name)))
    }

    /// A required string field of the request body, with the validation
    /// error shape when it is absent.
    pub fn body_str(&self, name: &str) -> Result<&'a str> {
        self.body
            .and_then(|b| b.get(name))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                let mut batch = ValidationErrors::default();
                batch.push(ValidationError::new(
                    name,
                    Vec::new(),
                    format!("The `{}` field is required", name),
                ));
                Error::Validation(batch)
            })
    }

    /// An optional string field of the request body.
    pub fn body_opt(&self, name: &str) -> Option<&'a str> {
        self.body.and_then(|b| b.get(name)).and_then(|v| v.as_str())
    }

    /// The caller's account, created on first sight so that every
    /// credential fingerprint acts as a real user.
    pub fn account(&self) -> Result<String> {
        if self.store.get_user(self.actor).is_none() {
            let username = format!("dev{}", self.actor);
            let name = format!("Developer {}", self.actor);
            self.store
                .create_user_with_id(self.actor, &username, &name)?;
        }
        Ok(self.actor.to_string())
    }

    /// Slices a full result set down to the requested page and builds the
    /// pagination meta: `next_token` appears only when the page filled and
    /// more items remain.
    pub fn paginate<T: Clone>(&self, items: Vec<T>) -> (Vec<T>, Meta) {
        let limits = self
            .spec
            .max_results_limits(self.resolved.item, self.resolved.operation);
        let page_size = self.query.page_size(limits);
        let offset = self
            .query
            .pagination_token
            .as_deref()
            .and_then(decode_cursor)
            .unwrap_or(0);

        let page: Vec<T> = items.into_iter().skip(offset).take(page_size).collect();
        let mut meta = Meta::collection(page.len());
        // a full page always advertises a cursor; the page after it may
        // come back empty, which is how the production service pages too
        if page.len() == page_size {
            meta.next_token = Some(encode_cursor(offset + page.len()));
        }
        if offset > 0 {
            meta.previous_token = Some(encode_cursor(offset.saturating_sub(page_size)));
        }
        (page, meta)
    }
}

type Handler = fn(&Ctx<'_>) -> Result<Outcome>;

/// Maps a matched `(method, pattern)` to its domain handler. `None` sends
/// the dispatcher on to the example store and schema generation.
pub fn route(method: &str, pattern: &str) -> Option<Handler> {

    let handler: Handler = match (method, pattern) {
        // users
        ("GET", p) if p == links::users::ME => self::users::me,
        ("GET", p) if p == links::users::LOOKUP => self::users::lookup,
        ("GET", p) if p == links::users::BY => self::users::by_usernames,
        ("GET", p) if p == links::users::BY_USERNAME => self::users::by_username,
        ("GET", p) if p == links::users::SEARCH => self::users::search,
        ("GET", p) if p == links::users::SHOW => self::users::show,
        ("GET", p) if p == links::users::FOLLOWING || p == links::users::FOLLOWS => self::users::following,
        ("POST", p) if p == links::users::FOLLOWING || p == links::users::FOLLOWS => self::users::follow,
        ("DELETE", p) if p == links::users::UNFOLLOW => self::users::unfollow,
        ("GET", p) if p == links::users::FOLLOWERS => self::users::followers,
        ("GET", p) if p == links::users::BLOCKING || p == links::users::BLOCKS => self::users::blocking,
        ("POST", p) if p == links::users::BLOCKING || p == links::users::BLOCKS => self::users::block,
        ("DELETE", p) if p == links::users::UNBLOCK => self::users::unblock,
        ("GET", p) if p == links::users::MUTING || p == links::users::MUTES => self::users::muting,
        ("POST", p) if p == links::users::MUTING || p == links::users::MUTES => self::users::mute,
        ("DELETE", p) if p == links::users::UNMUTE => self::users::unmute,
        ("GET", p) if p == links::users::BOOKMARKS => self::users::bookmarks,
        ("POST", p) if p == links::users::BOOKMARKS => self::users::bookmark,
        ("DELETE", p) if p == links::users::UNBOOKMARK => self::users::unbookmark,
        ("GET", p) if p == links::users::LIKED_TWEETS => self::users::liked_tweets,
        ("POST", p) if p == links::users::LIKES => self::users::like,
        ("DELETE", p) if p == links::users::UNLIKE => self::users::unlike,
        ("POST", p) if p == links::users::RETWEETS => self::users::retweet,
        ("DELETE", p) if p == links::users::UNRETWEET => self::users::unretweet,
        ("GET", p) if p == links::users::TWEETS => self::users::tweets,
        ("GET", p) if p == links::users::MENTIONS => self::users::mentions,
        ("GET", p) if p == links::users::HOME_TIMELINE => self::users::home_timeline,
        ("GET", p) if p == links::users::PINNED_LISTS => self::lists::pinned,
        ("POST", p) if p == links::users::PINNED_LISTS => self::lists::pin,
        ("DELETE", p) if p == links::users::UNPIN_LIST => self::lists::unpin,
        ("GET", p) if p == links::users::OWNED_LISTS => self::lists::owned,
        ("GET", p) if p == links::users::FOLLOWED_LISTS => self::lists::followed,
        ("POST", p) if p == links::users::FOLLOWED_LISTS => self::lists::follow,
        ("DELETE", p) if p == links::users::UNFOLLOW_LIST => self::lists::unfollow,
        ("GET", p) if p == links::users::LIST_MEMBERSHIPS => self::lists::memberships,
        ("GET", p) if p == links::users::PERSONALIZED_TRENDS => self::misc::personalized_trends,

        // tweets
        ("GET", p) if p == links::tweets::LOOKUP => self::tweets::lookup,
        ("POST", p) if p == links::tweets::LOOKUP => self::tweets::create,
        ("GET", p) if p == links::tweets::SHOW => self::tweets::show,
        ("DELETE", p) if p == links::tweets::SHOW => self::tweets::delete,
        ("GET", p) if p == links::tweets::SEARCH_RECENT || p == links::tweets::SEARCH_ALL => {
            self::tweets::search
        }
        ("GET", p) if p == links::tweets::COUNTS_RECENT => self::tweets::counts,
        ("GET", p) if p == links::tweets::LIKING_USERS => self::tweets::liking_users,
        ("GET", p) if p == links::tweets::RETWEETED_BY => self::tweets::retweeted_by,
        ("GET", p) if p == links::tweets::QUOTE_TWEETS => self::tweets::quote_tweets,
        ("GET", p) if p == links::tweets::STREAM_RULES => self::rules::list,
        ("POST", p) if p == links::tweets::STREAM_RULES => self::rules::mutate,
        ("GET", p) if p == links::tweets::STREAM_RULE_COUNTS => self::rules::counts,

        // lists
        ("POST", p) if p == links::lists::CREATE => self::lists::create,
        ("GET", p) if p == links::lists::SHOW => self::lists::show,
        ("PUT", p) if p == links::lists::SHOW => self::lists::update,
        ("DELETE", p) if p == links::lists::SHOW => self::lists::delete,
        ("GET", p) if p == links::lists::MEMBERS => self::lists::members,
        ("POST", p) if p == links::lists::MEMBERS => self::lists::add_member,
        ("DELETE", p) if p == links::lists::REMOVE_MEMBER => self::lists::remove_member,
        ("GET", p) if p == links::lists::TWEETS => self::lists::tweets,
        ("GET", p) if p == links::lists::FOLLOWERS => self::lists::followers,

        // spaces
        ("GET", p) if p == links::spaces::LOOKUP => self::spaces::lookup,
        ("GET", p) if p == links::spaces::SHOW => self::spaces::show,
        ("GET", p) if p == links::spaces::SEARCH => self::spaces::search,
        ("GET", p) if p == links::spaces::BY_CREATOR => self::spaces::by_creators,
        ("GET", p) if p == links::spaces::TWEETS => self::spaces::tweets,

        // direct messages
        ("POST", p) if p == links::direct::CONVERSATIONS => self::direct::create_conversation,
        ("POST", p) if p == links::direct::SEND_TO_PARTICIPANT => self::direct::send_to_participant,
        ("GET", p) if p == links::direct::EVENTS_WITH => self::direct::events_with,
        ("POST", p) if p == links::direct::SEND_TO_CONVERSATION => self::direct::send_to_conversation,
        ("GET", p) if p == links::direct::EVENTS => self::direct::events,

        // media
        ("POST", p) if p == links::media::UPLOAD => self::media::upload,
        ("GET", p) if p == links::media::UPLOAD => self::media::status,

        // communities, trends, compliance, usage, connections
        ("GET", p) if p == links::communities::SEARCH => self::misc::search_communities,
        ("GET", p) if p == links::communities::SHOW => self::misc::show_community,
        ("GET", p) if p == links::trends::BY_WOEID => self::misc::trends_by_woeid,
        ("POST", p) if p == links::compliance::JOBS => self::misc::create_compliance_job,
        ("GET", p) if p == links::compliance::JOBS => self::misc::compliance_jobs,
        ("GET", p) if p == links::compliance::SHOW => self::misc::show_compliance_job,
        ("GET", p) if p == links::usage::TWEETS => self::misc::usage,
        ("DELETE", p) if p == links::connections::ALL => self::misc::close_connections,

        _ => return None,
    };
    Some(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_route_to_the_same_handler() {
        let a = route("POST", links::users::FOLLOWING).unwrap();
        let b = route("POST", links::users::FOLLOWS).unwrap();
        assert_eq!(a as usize, b as usize);

        let a = route("GET", links::users::BLOCKING).unwrap();
        let b = route("GET", links::users::BLOCKS).unwrap();
        assert_eq!(a as usize, b as usize);
    }

    #[test]
    fn unrouted_operations_fall_through() {
        assert!(route("GET", links::notes::SEARCH_WRITTEN).is_none());
        assert!(route("PATCH", links::tweets::LOOKUP).is_none());
    }

    #[test]
    fn streaming_endpoints_have_no_unary_handler() {
        assert!(route("GET", links::tweets::FILTERED_STREAM).is_none());
        assert!(route("GET", links::tweets::SAMPLE_STREAM).is_none());
    }
}

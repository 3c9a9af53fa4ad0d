// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Path patterns for every endpoint the fake serves, plus the built-in
//! rate-limit table.
//!
//! The constants here are the *patterns* as they appear in the API
//! description (`{param}` segments included), not concrete request paths.
//! The rate limiter partitions its counters by these patterns so that all id
//! variants of an endpoint share one counter.

pub mod users {
    pub const LOOKUP: &'static str = "/2/users";
    pub const BY: &'static str = "/2/users/by";
    pub const BY_USERNAME: &'static str = "/2/users/by/username/{username}";
    pub const ME: &'static str = "/2/users/me";
    pub const SEARCH: &'static str = "/2/users/search";
    pub const PERSONALIZED_TRENDS: &'static str = "/2/users/personalized_trends";
    pub const SHOW: &'static str = "/2/users/{id}";
    pub const FOLLOWING: &'static str = "/2/users/{id}/following";
    pub const FOLLOWS: &'static str = "/2/users/{id}/follows";
    pub const UNFOLLOW: &'static str = "/2/users/{source_user_id}/following/{target_user_id}";
    pub const FOLLOWERS: &'static str = "/2/users/{id}/followers";
    pub const BLOCKING: &'static str = "/2/users/{id}/blocking";
    pub const BLOCKS: &'static str = "/2/users/{id}/blocks";
    pub const UNBLOCK: &'static str = "/2/users/{source_user_id}/blocking/{target_user_id}";
    pub const MUTING: &'static str = "/2/users/{id}/muting";
    pub const MUTES: &'static str = "/2/users/{id}/mutes";
    pub const UNMUTE: &'static str = "/2/users/{source_user_id}/muting/{target_user_id}";
    pub const BOOKMARKS: &'static str = "/2/users/{id}/bookmarks";
    pub const UNBOOKMARK: &'static str = "/2/users/{id}/bookmarks/{tweet_id}";
    pub const LIKED_TWEETS: &'static str = "/2/users/{id}/liked_tweets";
    pub const LIKES: &'static str = "/2/users/{id}/likes";
    pub const UNLIKE: &'static str = "/2/users/{id}/likes/{tweet_id}";
    pub const RETWEETS: &'static str = "/2/users/{id}/retweets";
    pub const UNRETWEET: &'static str = "/2/users/{id}/retweets/{source_tweet_id}";
    pub const TWEETS: &'static str = "/2/users/{id}/tweets";
    pub const MENTIONS: &'static str = "/2/users/{id}/mentions";
    pub const HOME_TIMELINE: &'static str = "/2/users/{id}/timelines/reverse_chronological";
    pub const PINNED_LISTS: &'static str = "/2/users/{id}/pinned_lists";
    pub const UNPIN_LIST: &'static str = "/2/users/{id}/pinned_lists/{list_id}";
    pub const OWNED_LISTS: &'static str = "/2/users/{id}/owned_lists";
    pub const FOLLOWED_LISTS: &'static str = "/2/users/{id}/followed_lists";
    pub const UNFOLLOW_LIST: &'static str = "/2/users/{id}/followed_lists/{list_id}";
    pub const LIST_MEMBERSHIPS: &'static str = "/2/users/{id}/list_memberships";
}

pub mod tweets {
    pub const LOOKUP: &'static str = "/2/tweets";
    pub const SHOW: &'static str = "/2/tweets/{id}";
    pub const SEARCH_RECENT: &'static str = "/2/tweets/search/recent";
    pub const SEARCH_ALL: &'static str = "/2/tweets/search/all";
    pub const COUNTS_RECENT: &'static str = "/2/tweets/counts/recent";
    pub const LIKING_USERS: &'static str = "/2/tweets/{id}/liking_users";
    pub const RETWEETED_BY: &'static str = "/2/tweets/{id}/retweeted_by";
    pub const QUOTE_TWEETS: &'static str = "/2/tweets/{id}/quote_tweets";
    pub const FILTERED_STREAM: &'static str = "/2/tweets/search/stream";
    pub const STREAM_RULES: &'static str = "/2/tweets/search/stream/rules";
    pub const STREAM_RULE_COUNTS: &'static str = "/2/tweets/search/stream/rules/counts";
    pub const SAMPLE_STREAM: &'static str = "/2/tweets/sample/stream";
    pub const FIREHOSE_STREAM: &'static str = "/2/tweets/firehose/stream";
}

pub mod lists {
    pub const CREATE: &'static str = "/2/lists";
    pub const SHOW: &'static str = "/2/lists/{id}";
    pub const MEMBERS: &'static str = "/2/lists/{id}/members";
    pub const REMOVE_MEMBER: &'static str = "/2/lists/{id}/members/{user_id}";
    pub const TWEETS: &'static str = "/2/lists/{id}/tweets";
    pub const FOLLOWERS: &'static str = "/2/lists/{id}/followers";
}

pub mod spaces {
    pub const LOOKUP: &'static str = "/2/spaces";
    pub const SHOW: &'static str = "/2/spaces/{id}";
    pub const SEARCH: &'static str = "/2/spaces/search";
    pub const BY_CREATOR: &'static str = "/2/spaces/by/creator_ids";
    pub const TWEETS: &'static str = "/2/spaces/{id}/tweets";
}

pub mod direct {
    pub const CONVERSATIONS: &'static str = "/2/dm_conversations";
    pub const SEND_TO_PARTICIPANT: &'static str =
        "/2/dm_conversations/with/{participant_id}/messages";
    pub const EVENTS_WITH: &'static str = "/2/dm_conversations/with/{participant_id}/dm_events";
    pub const SEND_TO_CONVERSATION: &'static str =
        "/2/dm_conversations/{dm_conversation_id}/messages";
    pub const EVENTS: &'static str = "/2/dm_events";
}

pub mod media {
    pub const UPLOAD: &'static str = "/2/media/upload";
}

pub mod communities {
    pub const SEARCH: &'static str = "/2/communities/search";
    pub const SHOW: &'static str = "/2/communities/{id}";
}

pub mod notes {
    pub const SEARCH_WRITTEN: &'static str = "/2/notes/search/notes_written";
}

pub mod trends {
    pub const BY_WOEID: &'static str = "/2/trends/by/woeid/{woeid}";
}

pub mod compliance {
    pub const JOBS: &'static str = "/2/compliance/jobs";
    pub const SHOW: &'static str = "/2/compliance/jobs/{id}";
}

pub mod usage {
    pub const TWEETS: &'static str = "/2/usage/tweets";
}

pub mod connections {
    pub const ALL: &'static str = "/2/connections/all";
}

pub mod admin {
    pub const HEALTH: &'static str = "/health";
    pub const RATE_LIMITS: &'static str = "/rate-limits";
    pub const PLAYGROUND: &'static str = "/playground";
}

/// One row of the built-in rate-limit table.
///
/// `method` of `None` applies the row to every verb on the endpoint. Exact
/// endpoint matches beat prefix matches; among prefix matches the longest
/// endpoint wins.
#[derive(Clone, Copy, Debug)]
pub struct RateRow {
    pub method: Option<&'static str>,
    pub endpoint: &'static str,
    pub limit: u32,
    pub window_secs: u64,
}

/// Fallback policy when no row and no override matches.
pub const DEFAULT_RATE_LIMIT: u32 = 15;
/// Window for the fallback policy, in seconds.
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 900;

/// The built-in policy table, mirroring the production per-app buckets.
pub const RATE_TABLE: &[RateRow] = &[
    RateRow { method: Some("GET"), endpoint: tweets::LOOKUP, limit: 300, window_secs: 900 },
    RateRow { method: Some("POST"), endpoint: tweets::LOOKUP, limit: 200, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::SHOW, limit: 300, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: tweets::SHOW, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::SEARCH_RECENT, limit: 450, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::SEARCH_ALL, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::COUNTS_RECENT, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::LIKING_USERS, limit: 75, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::RETWEETED_BY, limit: 75, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::QUOTE_TWEETS, limit: 75, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::FILTERED_STREAM, limit: 50, window_secs: 900 },
    RateRow { method: None, endpoint: tweets::STREAM_RULES, limit: 450, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::STREAM_RULE_COUNTS, limit: 450, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::SAMPLE_STREAM, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: tweets::FIREHOSE_STREAM, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::LOOKUP, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::BY, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::BY_USERNAME, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::ME, limit: 75, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::SEARCH, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::PERSONALIZED_TRENDS, limit: 10, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::SHOW, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::FOLLOWING, limit: 15, window_secs: 900 },
    RateRow { method: Some("POST"), endpoint: users::FOLLOWING, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::FOLLOWS, limit: 15, window_secs: 900 },
    RateRow { method: Some("POST"), endpoint: users::FOLLOWS, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNFOLLOW, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::FOLLOWERS, limit: 15, window_secs: 900 },
    RateRow { method: None, endpoint: users::BLOCKING, limit: 50, window_secs: 900 },
    RateRow { method: None, endpoint: users::BLOCKS, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNBLOCK, limit: 50, window_secs: 900 },
    RateRow { method: None, endpoint: users::MUTING, limit: 50, window_secs: 900 },
    RateRow { method: None, endpoint: users::MUTES, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNMUTE, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::BOOKMARKS, limit: 180, window_secs: 900 },
    RateRow { method: Some("POST"), endpoint: users::BOOKMARKS, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNBOOKMARK, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::LIKED_TWEETS, limit: 75, window_secs: 900 },
    RateRow { method: Some("POST"), endpoint: users::LIKES, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNLIKE, limit: 50, window_secs: 900 },
    RateRow { method: Some("POST"), endpoint: users::RETWEETS, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNRETWEET, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::TWEETS, limit: 1500, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::MENTIONS, limit: 450, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::HOME_TIMELINE, limit: 180, window_secs: 900 },
    RateRow { method: None, endpoint: users::PINNED_LISTS, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNPIN_LIST, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::OWNED_LISTS, limit: 15, window_secs: 900 },
    RateRow { method: None, endpoint: users::FOLLOWED_LISTS, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: users::UNFOLLOW_LIST, limit: 50, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: users::LIST_MEMBERSHIPS, limit: 75, window_secs: 900 },
    RateRow { method: Some("POST"), endpoint: lists::CREATE, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: lists::SHOW, limit: 75, window_secs: 900 },
    RateRow { method: Some("PUT"), endpoint: lists::SHOW, limit: 300, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: lists::SHOW, limit: 300, window_secs: 900 },
    RateRow { method: None, endpoint: lists::MEMBERS, limit: 300, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: lists::REMOVE_MEMBER, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: lists::TWEETS, limit: 900, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: lists::FOLLOWERS, limit: 180, window_secs: 900 },
    RateRow { method: None, endpoint: "/2/spaces", limit: 300, window_secs: 900 },
    RateRow { method: None, endpoint: "/2/dm_conversations", limit: 200, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: direct::EVENTS, limit: 100, window_secs: 900 },
    RateRow { method: None, endpoint: media::UPLOAD, limit: 615, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: communities::SEARCH, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: communities::SHOW, limit: 300, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: notes::SEARCH_WRITTEN, limit: 10, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: trends::BY_WOEID, limit: 75, window_secs: 900 },
    RateRow { method: None, endpoint: compliance::JOBS, limit: 150, window_secs: 900 },
    RateRow { method: Some("GET"), endpoint: usage::TWEETS, limit: 50, window_secs: 900 },
    RateRow { method: Some("DELETE"), endpoint: connections::ALL, limit: 500, window_secs: 900 },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_are_well_formed() {
        for row in RATE_TABLE {
            assert!(row.limit > 0, "zero limit for {}", row.endpoint);
            assert!(row.window_secs > 0, "zero window for {}", row.endpoint);
            assert!(
                row.endpoint.starts_with("/2/"),
                "non-API endpoint {} in table",
                row.endpoint
            );
        }
    }

    #[test]
    fn aliases_share_policy() {
        let policy = |endpoint: &str, method: &str| {
            RATE_TABLE
                .iter()
                .find(|r| r.endpoint == endpoint && r.method.map_or(true, |m| m == method))
                .map(|r| (r.limit, r.window_secs))
                .unwrap()
        };
        assert_eq!(policy(users::FOLLOWING, "GET"), policy(users::FOLLOWS, "GET"));
        assert_eq!(policy(users::BLOCKING, "POST"), policy(users::BLOCKS, "POST"));
        assert_eq!(policy(users::MUTING, "GET"), policy(users::MUTES, "GET"));
    }
}

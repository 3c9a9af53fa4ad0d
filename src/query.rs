// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Request-side query parsing: field selections, expansions, pagination
//! cursors, and the time/id bounds that search endpoints accept.
//!
//! Everything here is parsed permissively; the validator decides whether
//! the values are acceptable. The parsed record travels with the request
//! context so later stages never re-parse the query string.

use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use url::form_urlencoded;

/// The parsed query string of one request.
#[derive(Clone, Debug, Default)]
pub struct QueryParams {
    /// All decoded `(name, value)` pairs, in arrival order.
    pub raw: Vec<(String, String)>,
    /// `{type}.fields` selections, keyed by the type prefix (`user`,
    /// `tweet`, `list`, ...). Values keep their comma-split order.
    pub fields: HashMap<String, Vec<String>>,
    /// The `expansions` list, comma-split across repeats.
    pub expansions: Vec<String>,
    /// Opaque page cursor (`pagination_token` or `next_token`).
    pub pagination_token: Option<String>,
    /// `max_results`, when it parsed as an integer.
    pub max_results: Option<i64>,
    /// `start_time`, when it parsed as RFC 3339.
    pub start_time: Option<DateTime<Utc>>,
    /// `end_time`, when it parsed as RFC 3339.
    pub end_time: Option<DateTime<Utc>>,
    /// Lower id bound for searches.
    pub since_id: Option<String>,
    /// Upper id bound for searches.
    pub until_id: Option<String>,
    /// `sort_order`, verbatim.
    pub sort_order: Option<String>,
}

impl QueryParams {
    /// Parses the query string of a request URI. `None` yields the empty
    /// record.
    pub fn parse(query: Option<&str>) -> QueryParams {
        let mut params = QueryParams::default();
        let query = match query {
            Some(q) if !q.is_empty() => q,
            _ => return params,
        };

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            params.absorb(&name, &value);
            params.raw.push((name.into_owned(), value.into_owned()));
        }
        params
    }

    fn absorb(&mut self, name: &str, value: &str) {
        if let Some(prefix) = name.strip_suffix(".fields") {
            self.fields
                .entry(prefix.to_string())
                .or_default()
                .extend(split_list(value));
            return;
        }
        match name {
            "expansions" => self.expansions.extend(split_list(value)),
            "pagination_token" | "next_token" => {
                self.pagination_token = Some(value.to_string())
            }
            "max_results" => self.max_results = value.parse().ok(),
            "start_time" => {
                self.start_time = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            "end_time" => {
                self.end_time = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            "since_id" => self.since_id = Some(value.to_string()),
            "until_id" => self.until_id = Some(value.to_string()),
            "sort_order" => self.sort_order = Some(value.to_string()),
            _ => {}
        }
    }

    /// First value of the given query parameter, verbatim.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of the given parameter, comma-split and flattened.
    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.raw
            .iter()
            .filter(|(n, _)| n == name)
            .flat_map(|(_, v)| split_list(v))
            .collect()
    }

    /// The requested field selection for an object type, if any.
    pub fn fields_for(&self, ty: &str) -> Option<&[String]> {
        self.fields.get(ty).map(|v| v.as_slice())
    }

    /// Whether the client asked for any expansion at all.
    pub fn has_expansions(&self) -> bool {
        !self.expansions.is_empty()
    }

    /// The effective page size given the operation's declared limits.
    pub fn page_size(&self, limits: Option<(i64, i64, i64)>) -> usize {
        let (minimum, maximum, default) = limits.unwrap_or((1, 100, 10));
        let requested = self.max_results.unwrap_or(default);
        requested.max(minimum).min(maximum).max(1) as usize
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Encodes a page offset as the opaque `next_token` cursor.
///
/// The token deliberately round-trips through base64 so that clients treat
/// it as opaque, the same way they must with the production service.
pub fn encode_cursor(offset: usize) -> String {
    base64::encode_config(format!("o:{}", offset), base64::URL_SAFE_NO_PAD)
}

/// Decodes a cursor produced by [`encode_cursor`]. Unparseable tokens page
/// from the start rather than failing the request.
pub fn decode_cursor(token: &str) -> Option<usize> {
    let bytes = base64::decode_config(token, base64::URL_SAFE_NO_PAD).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix("o:")?.parse().ok()
}

/// Percent-decodes a path segment (ids and usernames arrive encoded from
/// some client libraries).
pub fn decode_segment(segment: &str) -> Cow<'_, str> {
    percent_encoding::percent_decode_str(segment).decode_utf8_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_fields_and_expansions() {
        let params = QueryParams::parse(Some(
            "tweet.fields=created_at,author_id&user.fields=name&expansions=author_id,attachments.media_keys",
        ));
        assert_eq!(
            params.fields_for("tweet").unwrap(),
            &["created_at".to_string(), "author_id".to_string()][..]
        );
        assert_eq!(params.fields_for("user").unwrap(), &["name".to_string()][..]);
        assert_eq!(params.expansions.len(), 2);
        assert!(params.has_expansions());
    }

    #[test]
    fn repeated_parameters_merge() {
        let params = QueryParams::parse(Some("ids=1,2&ids=3"));
        assert_eq!(
            params.get_list("ids"),
            vec!["1".to_string(), "2".to_string(), "3".to_string()]
        );
        // `get` keeps returning the first raw value
        assert_eq!(params.get("ids"), Some("1,2"));
    }

    #[test]
    fn time_bounds_parse_rfc3339() {
        let params = QueryParams::parse(Some(
            "start_time=2023-01-01T00:00:00Z&end_time=not-a-date",
        ));
        assert!(params.start_time.is_some());
        assert!(params.end_time.is_none());
    }

    #[test]
    fn page_size_clamps_to_limits() {
        let limits = Some((5, 100, 10));
        assert_eq!(QueryParams::parse(None).page_size(limits), 10);
        assert_eq!(
            QueryParams::parse(Some("max_results=3")).page_size(limits),
            5
        );
        assert_eq!(
            QueryParams::parse(Some("max_results=500")).page_size(limits),
            100
        );
    }

    #[test]
    fn cursors_round_trip_and_stay_opaque() {
        let token = encode_cursor(40);
        assert_ne!(token, "40");
        assert_eq!(decode_cursor(&token), Some(40));
        assert_eq!(decode_cursor("garbage!"), None);
    }
}

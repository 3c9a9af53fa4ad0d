// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Runtime configuration for the server process.
//!
//! Everything here is read once at startup and again on a reload signal.
//! The binary builds a `Config` from its flags; tests build one directly.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::limit::{PolicyOverride, PolicySource};

/// Default cap on request bodies, in bytes.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;
/// Default server-side deadline for unary requests, in seconds.
pub const REQUEST_DEADLINE_SECS: u64 = 30;
/// Default pause between streamed items, in milliseconds.
pub const STREAM_DELAY_MS: u64 = 200;
/// Ceiling for the configurable stream delay.
pub const STREAM_DELAY_MAX_MS: u64 = 10_000;

/// The error kinds the simulation layer can substitute for a real response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulatedError {
    RateLimited,
    Unauthorized,
    Forbidden,
    NotFound,
    Timeout,
    Internal,
}

impl SimulatedError {
    pub fn parse(name: &str) -> Option<SimulatedError> {
        match name {
            "rate-limited" | "429" => Some(SimulatedError::RateLimited),
            "unauthorized" | "401" => Some(SimulatedError::Unauthorized),
            "forbidden" | "403" => Some(SimulatedError::Forbidden),
            "not-found" | "404" => Some(SimulatedError::NotFound),
            "timeout" | "408" => Some(SimulatedError::Timeout),
            "internal" | "500" => Some(SimulatedError::Internal),
            _ => None,
        }
    }

    /// The error this kind surfaces as when the dice roll hits.
    pub fn to_error(self) -> Error {
        match self {
            SimulatedError::RateLimited => Error::RateLimited,
            SimulatedError::Unauthorized => Error::Unauthorized,
            SimulatedError::Forbidden => Error::Forbidden {
                title: "Forbidden",
                detail: "Forbidden".to_string(),
            },
            SimulatedError::NotFound => {
                Error::RouteNotFound("simulated".to_string())
            }
            SimulatedError::Timeout => Error::Timeout,
            SimulatedError::Internal => {
                Error::Internal("simulated server error".to_string())
            }
        }
    }
}

/// Error-simulation settings: with probability `rate`, a request that
/// passed rate limiting and authentication is answered with one of
/// `kinds` instead of its real response.
#[derive(Clone, Debug)]
pub struct ErrorSimulation {
    pub rate: f64,
    pub kinds: Vec<SimulatedError>,
}

/// Process-wide configuration, bundled per the explicit-server-record rule.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Seed-state JSON, imported at startup through the same validation as
    /// a live import.
    pub seed_path: Option<PathBuf>,
    /// Directory of canned example responses layered over the embedded set.
    pub examples_dir: Option<PathBuf>,
    /// On-disk OpenAPI document; the embedded one serves otherwise.
    pub spec_path: Option<PathBuf>,
    /// When false, the auth classifier still runs (fingerprints are always
    /// needed) but mismatches are not enforced.
    pub validate_auth: bool,
    pub error_simulation: Option<ErrorSimulation>,
    pub rate_overrides: Vec<PolicyOverride>,
    /// Overrides file re-read on a reload signal.
    pub rate_overrides_path: Option<PathBuf>,
    pub body_limit: usize,
    pub request_deadline_secs: u64,
    pub stream_delay_ms: u64,
    /// Optional wall-clock cap on a single streaming connection.
    pub stream_time_limit_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 8080,
            seed_path: None,
            examples_dir: None,
            spec_path: None,
            validate_auth: true,
            error_simulation: None,
            rate_overrides: Vec::new(),
            rate_overrides_path: None,
            body_limit: BODY_LIMIT,
            request_deadline_secs: REQUEST_DEADLINE_SECS,
            stream_delay_ms: STREAM_DELAY_MS,
            stream_time_limit_secs: None,
        }
    }
}

impl Config {
    /// The effective inter-item stream delay, clamped to the ceiling.
    pub fn stream_delay_ms(&self) -> u64 {
        self.stream_delay_ms.min(STREAM_DELAY_MAX_MS)
    }

    /// Wraps the configured overrides as the limiter's swappable source.
    pub fn policy_source(&self) -> PolicySource {
        let overrides = Arc::new(self.rate_overrides.clone());
        Arc::new(move || Arc::clone(&overrides))
    }
}

#[derive(Deserialize)]
struct OverrideRow {
    method: Option<String>,
    endpoint: String,
    limit: u32,
    window_secs: u64,
}

/// Parses a rate-limit overrides file: a JSON array of
/// `{method?, endpoint, limit, window_secs}` rows.
pub fn load_overrides(source: &str) -> Result<Vec<PolicyOverride>> {
    let rows: Vec<OverrideRow> = serde_json::from_str(source)?;
    Ok(rows
        .into_iter()
        .map(|row| PolicyOverride {
            method: row.method,
            endpoint: row.endpoint,
            limit: row.limit,
            window_secs: row.window_secs,
        })
        .collect())
}

/// Parses a single `--rate-limit` flag of the form
/// `[METHOD:]ENDPOINT=LIMIT/WINDOW_SECS`.
pub fn parse_override_flag(flag: &str) -> Result<PolicyOverride> {
    let bad = || Error::Internal(format!("malformed rate-limit override: {}", flag));
    let (target, policy) = flag.split_once('=').ok_or_else(bad)?;
    let (limit, window) = policy.split_once('/').ok_or_else(bad)?;
    let (method, endpoint) = match target.split_once(':') {
        // "GET:/2/tweets" — but a bare path also contains no colon before
        // the slash, so only treat the head as a method when it looks like one
        Some((head, rest)) if head.chars().all(|c| c.is_ascii_alphabetic()) => {
            (Some(head.to_uppercase()), rest.to_string())
        }
        _ => (None, target.to_string()),
    };
    Ok(PolicyOverride {
        method,
        endpoint,
        limit: limit.trim().parse().map_err(|_| bad())?,
        window_secs: window.trim().parse().map_err(|_| bad())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_flags_parse_both_forms() {
        let with_method = parse_override_flag("GET:/2/tweets=100/300").unwrap();
        assert_eq!(with_method.method.as_deref(), Some("GET"));
        assert_eq!(with_method.endpoint, "/2/tweets");
        assert_eq!((with_method.limit, with_method.window_secs), (100, 300));

        let bare = parse_override_flag("/2/lists=5/60").unwrap();
        assert_eq!(bare.method, None);
        assert_eq!(bare.endpoint, "/2/lists");

        assert!(parse_override_flag("nonsense").is_err());
    }

    #[test]
    fn overrides_file_round_trips() {
        let rows = load_overrides(
            r#"[{"method": "POST", "endpoint": "/2/tweets", "limit": 10, "window_secs": 60},
                {"endpoint": "/2/users", "limit": 5, "window_secs": 900}]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].method.as_deref(), Some("POST"));
        assert_eq!(rows[1].method, None);
    }

    #[test]
    fn stream_delay_is_clamped() {
        let mut config = Config::default();
        config.stream_delay_ms = 60_000;
        assert_eq!(config.stream_delay_ms(), STREAM_DELAY_MAX_MS);
    }

    #[test]
    fn simulated_error_names() {
        assert_eq!(SimulatedError::parse("429"), Some(SimulatedError::RateLimited));
        assert_eq!(SimulatedError::parse("timeout"), Some(SimulatedError::Timeout));
        assert_eq!(SimulatedError::parse("weird"), None);
    }
}

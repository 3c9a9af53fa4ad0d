// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The credential-scoped rate limiter: sliding-window counters partitioned
//! by `(credential fingerprint, endpoint key)`.
//!
//! The endpoint key is always the *matched pattern* (`/2/tweets/{id}`), not
//! the concrete request path, so that all id variants of an endpoint drain
//! one shared counter. Policies come from three places, first hit wins:
//! runtime overrides (swappable while serving), the built-in table in
//! [`crate::links`], and the 15-per-900-seconds default.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::common::envelope::RateLimit;
use crate::links::{self, RateRow};

/// How often (in served requests) the reclamation pass runs, and how many
/// drained counters one pass may delete.
const RECLAIM_STRIDE: u64 = 50;
const RECLAIM_BATCH: usize = 50;

/// One effective rate-limit policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub limit: u32,
    pub window_secs: u64,
}

impl Policy {
    fn default_policy() -> Policy {
        Policy {
            limit: links::DEFAULT_RATE_LIMIT,
            window_secs: links::DEFAULT_RATE_WINDOW_SECS,
        }
    }
}

/// A runtime policy override, keyed by `METHOD:endpoint`, a bare endpoint,
/// or a path prefix.
#[derive(Clone, Debug)]
pub struct PolicyOverride {
    pub method: Option<String>,
    pub endpoint: String,
    pub limit: u32,
    pub window_secs: u64,
}

/// Zero-arg source for the active override set; the limiter re-reads it on
/// every request so a reload swaps behavior without restart.
pub type PolicySource = Arc<dyn Fn() -> Arc<Vec<PolicyOverride>> + Send + Sync>;

/// The admission decision for one request.
#[derive(Clone, Copy, Debug)]
pub struct Decision {
    pub allowed: bool,
    /// Header trio reflecting the counter *after* this sighting.
    pub rate: RateLimit,
}

struct Window {
    stamps: VecDeque<i64>,
    window_secs: u64,
}

impl Window {
    fn prune(&mut self, now: i64) {
        let cutoff = now - self.window_secs as i64;
        while matches!(self.stamps.front(), Some(&t) if t <= cutoff) {
            self.stamps.pop_front();
        }
    }

    fn reset_at(&self, now: i64) -> i64 {
        match self.stamps.front() {
            Some(&oldest) => oldest + self.window_secs as i64,
            None => now + self.window_secs as i64,
        }
    }
}

/// A live view of one counter, for the `/rate-limits` diagnostics dump.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CounterSnapshot {
    pub credential: String,
    pub endpoint: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
    pub in_window: usize,
}

/// The limiter itself. One instance per server.
pub struct RateLimiter {
    source: RwLock<PolicySource>,
    counters: RwLock<HashMap<(String, String), Window>>,
    served: AtomicU64,
}

impl RateLimiter {
    pub fn new(source: PolicySource) -> RateLimiter {
        RateLimiter {
            source: RwLock::new(source),
            counters: RwLock::new(HashMap::new()),
            served: AtomicU64::new(0),
        }
    }

    /// A limiter with no overrides; built-in table and default only.
    pub fn with_builtin_table() -> RateLimiter {
        let empty: Arc<Vec<PolicyOverride>> = Arc::new(Vec::new());
        RateLimiter::new(Arc::new(move || Arc::clone(&empty)))
    }

    /// Swaps the active policy source. Counters keep their history; only
    /// the limits applied to future sightings change.
    pub fn set_source(&self, source: PolicySource) {
        *self.source.write().unwrap() = source;
    }

    /// Resolves the policy for a request, in override → table → default
    /// order.
    pub fn resolve_policy(&self, method: &str, pattern: &str, path: &str) -> Policy {
        let overrides = (self.source.read().unwrap())();
        for entry in overrides.iter() {
            if let Some(m) = &entry.method {
                if !m.eq_ignore_ascii_case(method) {
                    continue;
                }
            }
            let hit = entry.endpoint == pattern
                || entry.endpoint == path
                || path.starts_with(&entry.endpoint)
                || pattern.starts_with(&entry.endpoint);
            if hit {
                return Policy {
                    limit: entry.limit,
                    window_secs: entry.window_secs,
                };
            }
        }

        let mut best: Option<&RateRow> = None;
        for row in links::RATE_TABLE {
            if let Some(m) = row.method {
                if !m.eq_ignore_ascii_case(method) {
                    continue;
                }
            }
            if row.endpoint == pattern {
                best = Some(row);
                break;
            }
            if pattern.starts_with(row.endpoint) {
                let longer = best.map_or(true, |b| {
                    b.endpoint != pattern && row.endpoint.len() > b.endpoint.len()
                });
                if longer {
                    best = Some(row);
                }
            }
        }
        best.map(|row| Policy {
            limit: row.limit,
            window_secs: row.window_secs,
        })
        .unwrap_or_else(Policy::default_policy)
    }

    /// Sights one request and decides admission.
    ///
    /// `pattern` is the endpoint key; `path` is only consulted for
    /// override prefix matching. `HEAD` is expected to arrive already
    /// mapped to `GET` by the router.
    pub fn check(&self, fingerprint: &str, method: &str, pattern: &str, path: &str, now: i64) -> Decision {
        let policy = self.resolve_policy(method, pattern, path);
        let key = (fingerprint.to_string(), pattern.to_string());

        let decision = {
            let mut counters = self.counters.write().unwrap();
            let window = counters.entry(key).or_insert_with(|| Window {
                stamps: VecDeque::new(),
                window_secs: policy.window_secs,
            });
            window.window_secs = policy.window_secs;
            window.prune(now);

            if window.stamps.len() >= policy.limit as usize {
                Decision {
                    allowed: false,
                    rate: RateLimit::new(policy.limit, 0, window.reset_at(now)),
                }
            } else {
                window.stamps.push_back(now);
                let remaining = policy.limit - window.stamps.len() as u32;
                Decision {
                    allowed: true,
                    rate: RateLimit::new(policy.limit, remaining, window.reset_at(now)),
                }
            }
        };

        let served = self.served.fetch_add(1, Ordering::Relaxed) + 1;
        if served % RECLAIM_STRIDE == 0 {
            self.reclaim(now);
        }
        decision
    }

    /// Deletes up to [`RECLAIM_BATCH`] counters whose windows drained.
    fn reclaim(&self, now: i64) {
        let mut counters = self.counters.write().unwrap();
        let drained: Vec<(String, String)> = counters
            .iter_mut()
            .filter_map(|(key, window)| {
                window.prune(now);
                if window.stamps.is_empty() {
                    Some(key.clone())
                } else {
                    None
                }
            })
            .take(RECLAIM_BATCH)
            .collect();
        for key in drained {
            counters.remove(&key);
        }
    }

    /// Number of live counters; used by tests and diagnostics.
    pub fn counter_count(&self) -> usize {
        self.counters.read().unwrap().len()
    }

    /// A point-in-time dump of every live counter for `/rate-limits`.
    pub fn snapshot(&self, now: i64) -> Vec<CounterSnapshot> {
        let counters = self.counters.read().unwrap();
        let mut out: Vec<CounterSnapshot> = counters
            .iter()
            .map(|((credential, endpoint), window)| {
                let in_window = window
                    .stamps
                    .iter()
                    .filter(|&&t| t > now - window.window_secs as i64)
                    .count();
                // the stored window does not remember its policy limit, so
                // re-resolve against the endpoint key with no method bias
                let policy = self.resolve_policy("GET", endpoint, endpoint);
                CounterSnapshot {
                    credential: credential.clone(),
                    endpoint: endpoint.clone(),
                    limit: policy.limit,
                    remaining: policy.limit.saturating_sub(in_window as u32),
                    reset: window.reset_at(now),
                    in_window,
                }
            })
            .collect();
        out.sort_by(|a, b| {
            a.credential
                .cmp(&b.credential)
                .then(a.endpoint.cmp(&b.endpoint))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::tweets;

    fn limiter_with(overrides: Vec<PolicyOverride>) -> RateLimiter {
        let overrides = Arc::new(overrides);
        RateLimiter::new(Arc::new(move || Arc::clone(&overrides)))
    }

    #[test]
    fn default_policy_applies_to_unknown_endpoints() {
        let limiter = RateLimiter::with_builtin_table();
        let policy = limiter.resolve_policy("GET", "/2/frobnicate", "/2/frobnicate");
        assert_eq!(policy.limit, links::DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn exact_table_rows_beat_prefixes() {
        let limiter = RateLimiter::with_builtin_table();
        let policy = limiter.resolve_policy("GET", tweets::SEARCH_RECENT, "/2/tweets/search/recent");
        assert_eq!(policy.limit, 450);

        // the {id} pattern row, not the /2/tweets collection row
        let policy = limiter.resolve_policy("DELETE", tweets::SHOW, "/2/tweets/5");
        assert_eq!(policy.limit, 50);
    }

    #[test]
    fn overrides_win_and_can_be_swapped() {
        let limiter = limiter_with(vec![PolicyOverride {
            method: Some("GET".to_string()),
            endpoint: tweets::LOOKUP.to_string(),
            limit: 2,
            window_secs: 60,
        }]);
        assert_eq!(
            limiter.resolve_policy("GET", tweets::LOOKUP, "/2/tweets").limit,
            2
        );

        let empty: Arc<Vec<PolicyOverride>> = Arc::new(Vec::new());
        limiter.set_source(Arc::new(move || Arc::clone(&empty)));
        assert_eq!(
            limiter.resolve_policy("GET", tweets::LOOKUP, "/2/tweets").limit,
            300
        );
    }

    #[test]
    fn window_fills_then_rejects_with_reset_from_oldest() {
        let limiter = limiter_with(vec![PolicyOverride {
            method: None,
            endpoint: "/2/widgets".to_string(),
            limit: 3,
            window_secs: 900,
        }]);

        let now = 1_700_000_000;
        for i in 0..3 {
            let decision = limiter.check("7", "GET", "/2/widgets", "/2/widgets", now + i);
            assert!(decision.allowed);
            assert_eq!(decision.rate.remaining, 2 - i as u32);
        }
        let denied = limiter.check("7", "GET", "/2/widgets", "/2/widgets", now + 3);
        assert!(!denied.allowed);
        assert_eq!(denied.rate.remaining, 0);
        assert_eq!(denied.rate.reset, now + 900);

        // a different credential gets its own window
        assert!(limiter.check("8", "GET", "/2/widgets", "/2/widgets", now + 3).allowed);

        // once the oldest stamp ages out, admission resumes
        let later = now + 901;
        assert!(limiter.check("7", "GET", "/2/widgets", "/2/widgets", later).allowed);
    }

    #[test]
    fn id_variants_share_one_counter() {
        let limiter = limiter_with(vec![PolicyOverride {
            method: None,
            endpoint: tweets::SHOW.to_string(),
            limit: 2,
            window_secs: 900,
        }]);
        let now = 1_700_000_000;
        assert!(limiter.check("7", "GET", tweets::SHOW, "/2/tweets/1", now).allowed);
        assert!(limiter.check("7", "GET", tweets::SHOW, "/2/tweets/2", now).allowed);
        assert!(!limiter.check("7", "GET", tweets::SHOW, "/2/tweets/3", now).allowed);
        assert_eq!(limiter.counter_count(), 1);
    }

    #[test]
    fn drained_counters_get_reclaimed() {
        let limiter = limiter_with(Vec::new());
        let now = 1_700_000_000;
        limiter.check("7", "GET", "/2/widgets", "/2/widgets", now);
        assert_eq!(limiter.counter_count(), 1);

        // push the served counter across the stride with sightings far in
        // the future, so the first window has fully drained
        let later = now + 10_000;
        for i in 0..(RECLAIM_STRIDE as i64) {
            limiter.check("9", "GET", "/2/other", "/2/other", later + i);
        }
        let keys: Vec<String> = limiter
            .snapshot(later)
            .into_iter()
            .map(|s| s.endpoint)
            .collect();
        assert!(!keys.contains(&"/2/widgets".to_string()));
    }
}

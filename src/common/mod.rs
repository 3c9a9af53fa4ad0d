// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Set of structs and helpers that act as a sort of internal prelude.
//!
//! The elements in this module are the basic building blocks the rest of the
//! crate glob-imports as a common language: the header names the fake emits
//! on every response, the clock and request-id helpers, and the well-known
//! format patterns (snowflake ids, usernames, media keys) that both the
//! validator and the domain store need to agree on.
//!
//! The `envelope` submodule is spilled into this one and re-exported; it
//! holds the wire envelope types (`Envelope`, `Meta`, `RateLimit`) that
//! every served response is assembled from.

pub mod envelope;

pub use self::envelope::*;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

/// Convenience alias for a response header map.
pub type Headers = hyper::HeaderMap;

/// The rate-limit ceiling header, present on every served response.
pub const X_RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
/// The remaining-calls header, present on every served response.
pub const X_RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
/// The window-reset header (Unix seconds), present on every served response.
pub const X_RATE_LIMIT_RESET: &str = "x-rate-limit-reset";
/// Per-request correlation id header.
pub const X_REQUEST_ID: &str = "x-request-id";
/// Optional client override for the detected authentication scheme.
pub const X_AUTH_METHOD: &str = "x-auth-method";

lazy_static! {
    /// Snowflake-shaped ids: numeric only, up to 19 decimal digits.
    pub static ref SNOWFLAKE_RE: Regex = Regex::new(r"^[0-9]{1,19}$").unwrap();
    /// Usernames as Twitter accepts them.
    pub static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{1,15}$").unwrap();
    /// Media keys: a numeric category prefix and a numeric id.
    pub static ref MEDIA_KEY_RE: Regex = Regex::new(r"^\d+_\d+$").unwrap();
}

/// Current wall-clock time as Unix seconds.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current wall-clock time formatted the way the v2 API formats `created_at`.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Generates the per-request correlation id written to `x-request-id`.
///
/// The real service uses an opaque lowercase hex token; sixteen random bytes
/// rendered as hex is indistinguishable for clients that only log it.
pub fn request_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    let mut out = String::with_capacity(32);
    for b in &bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Returns true when the given string is a well-formed snowflake id.
pub fn is_snowflake(s: &str) -> bool {
    SNOWFLAKE_RE.is_match(s)
}

/// A cooperative cancellation signal threaded from the transport into
/// every handler.
///
/// Long in-memory scans poll this at fixed strides and bail with partial
/// results; the streaming runtime polls it between emissions. Cloning is
/// cheap and all clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct Cancel(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl Cancel {
    pub fn new() -> Cancel {
        Cancel::default()
    }

    /// A token that can never fire; for tests and seed-time work.
    pub fn never() -> Cancel {
        Cancel::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Read;

    pub(crate) fn load_file(path: &str) -> String {
        let mut file = File::open(path).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn snowflake_shapes() {
        assert!(is_snowflake("0"));
        assert!(is_snowflake("20"));
        assert!(is_snowflake("1346889436626259968"));
        assert!(!is_snowflake(""));
        assert!(!is_snowflake("abc"));
        assert!(!is_snowflake("12345678901234567890"));
        assert!(!is_snowflake("-1"));
    }

    #[test]
    fn username_shapes() {
        assert!(USERNAME_RE.is_match("TwitterDev"));
        assert!(USERNAME_RE.is_match("a_b_c"));
        assert!(!USERNAME_RE.is_match("has-dash"));
        assert!(!USERNAME_RE.is_match("sixteen_chars_xx"));
        assert!(!USERNAME_RE.is_match(""));
    }

    #[test]
    fn request_ids_are_opaque_hex() {
        let id = request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(request_id(), request_id());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Classifying the credentials on a request and matching them against an
//! operation's declared security.
//!
//! No signature is ever verified: the fake only needs to know *which kind*
//! of credential the client presented, and a stable short fingerprint of it
//! to partition rate limits and synthesize a developer-account id. Clients
//! that want to exercise a specific failure mode can force the detected
//! scheme with the `x-auth-method` header instead of crafting real tokens.

use std::collections::HashMap;

use crate::common::{Headers, X_AUTH_METHOD};
use crate::error::{Error, Result};
use crate::spec::SchemeKind;

/// The authentication scheme detected on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Authorization: Bearer ...` — app-only unless overridden.
    Bearer,
    /// `Authorization: OAuth ...` with consumer key and signature.
    OAuth1,
    /// A bearer-shaped token the client declared to be a user token.
    OAuth2User,
    /// No credentials at all.
    None,
}

impl AuthMethod {
    /// The label used by the `x-auth-method` override and the logs.
    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::Bearer => "bearer",
            AuthMethod::OAuth1 => "oauth1",
            AuthMethod::OAuth2User => "oauth2user",
            AuthMethod::None => "none",
        }
    }

    fn satisfies(&self, scheme: SchemeKind) -> bool {
        match (self, scheme) {
            (AuthMethod::Bearer, SchemeKind::Bearer) => true,
            (AuthMethod::OAuth1, SchemeKind::OAuth1) => true,
            (AuthMethod::OAuth2User, SchemeKind::OAuth2User) => true,
            _ => false,
        }
    }
}

/// The classified credentials of one request.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub method: AuthMethod,
    /// Stable short id derived from the credential material; doubles as the
    /// rate-limit partition key and the synthetic developer-account id.
    pub fingerprint: String,
}

/// Inspects the request headers and classifies the credentials.
pub fn classify(headers: &Headers) -> Credentials {
    let authorization = headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let method = match headers
        .get(X_AUTH_METHOD)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("bearer") => AuthMethod::Bearer,
        Some("oauth1") => AuthMethod::OAuth1,
        Some("oauth2user") => AuthMethod::OAuth2User,
        Some("none") => AuthMethod::None,
        _ => detect(authorization),
    };

    let material = credential_material(method, authorization);
    Credentials {
        method,
        fingerprint: fingerprint(&material),
    }
}

fn detect(authorization: &str) -> AuthMethod {
    if authorization.is_empty() {
        return AuthMethod::None;
    }
    if let Some(rest) = strip_scheme(authorization, "OAuth") {
        let params = parse_oauth_params(rest);
        if params.contains_key("oauth_consumer_key") && params.contains_key("oauth_signature") {
            return AuthMethod::OAuth1;
        }
    }
    if strip_scheme(authorization, "Bearer").is_some() {
        return AuthMethod::Bearer;
    }
    AuthMethod::None
}

fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, rest) = header.split_at(header.len().min(scheme.len()));
    if head.eq_ignore_ascii_case(scheme) && rest.starts_with(' ') {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Parses the `k="v", k2="v2"` parameter list of an OAuth1 header.
pub fn parse_oauth_params(rest: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for piece in rest.split(',') {
        let piece = piece.trim();
        if let Some(eq) = piece.find('=') {
            let key = piece[..eq].trim().to_string();
            let value = piece[eq + 1..].trim().trim_matches('"').to_string();
            params.insert(key, value);
        }
    }
    params
}

fn credential_material(method: AuthMethod, authorization: &str) -> String {
    match method {
        AuthMethod::Bearer | AuthMethod::OAuth2User => strip_scheme(authorization, "Bearer")
            .unwrap_or(authorization)
            .to_string(),
        AuthMethod::OAuth1 => {
            let rest = strip_scheme(authorization, "OAuth").unwrap_or(authorization);
            parse_oauth_params(rest)
                .remove("oauth_consumer_key")
                .unwrap_or_else(|| authorization.to_string())
        }
        AuthMethod::None => String::new(),
    }
}

/// Derives the stable fingerprint for a piece of credential material.
///
/// The literal `"test"` and the empty string collapse to `"0"`, the
/// default account, so that tutorials can use `Bearer test` and act as the
/// seeded user. Everything else lands in one of 1000 stable buckets.
pub fn fingerprint(material: &str) -> String {
    if material.is_empty() || material == "test" {
        return "0".to_string();
    }
    let mut hash: u32 = 0;
    for byte in material.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    (hash % 1000).to_string()
}

/// Matches the detected scheme against the operation's accepted set.
///
/// `accepted` of `None` means the operation declared no security and
/// anything goes. An anonymous request against any secured operation is a
/// 401; an authenticated request of the wrong scheme is a 403 with the
/// fixed `Unsupported Authentication` envelope.
pub fn authorize(detected: AuthMethod, accepted: Option<&[SchemeKind]>) -> Result<()> {
    let accepted = match accepted {
        None => return Ok(()),
        Some(accepted) => accepted,
    };
    if accepted.iter().any(|scheme| detected.satisfies(*scheme)) {
        return Ok(());
    }
    match detected {
        AuthMethod::None => Err(Error::Unauthorized),
        _ => Err(Error::UnsupportedAuth),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::AUTHORIZATION;

    fn headers_with(auth: Option<&str>, override_method: Option<&str>) -> Headers {
        let mut headers = Headers::new();
        if let Some(auth) = auth {
            headers.insert(AUTHORIZATION, auth.parse().unwrap());
        }
        if let Some(method) = override_method {
            headers.insert(X_AUTH_METHOD, method.parse().unwrap());
        }
        headers
    }

    #[test]
    fn detects_bearer_oauth1_and_none() {
        let creds = classify(&headers_with(Some("Bearer AAAA"), None));
        assert_eq!(creds.method, AuthMethod::Bearer);

        let creds = classify(&headers_with(
            Some(r#"OAuth oauth_consumer_key="ck", oauth_signature="sig", oauth_nonce="n""#),
            None,
        ));
        assert_eq!(creds.method, AuthMethod::OAuth1);

        let creds = classify(&headers_with(None, None));
        assert_eq!(creds.method, AuthMethod::None);
        assert_eq!(creds.fingerprint, "0");
    }

    #[test]
    fn override_header_wins() {
        let creds = classify(&headers_with(Some("Bearer AAAA"), Some("oauth2user")));
        assert_eq!(creds.method, AuthMethod::OAuth2User);

        let creds = classify(&headers_with(Some("Bearer AAAA"), Some("none")));
        assert_eq!(creds.method, AuthMethod::None);
    }

    #[test]
    fn test_token_is_the_default_account() {
        let creds = classify(&headers_with(Some("Bearer test"), None));
        assert_eq!(creds.fingerprint, "0");
    }

    #[test]
    fn fingerprints_are_stable_buckets() {
        let a = fingerprint("AAAA-BBBB");
        assert_eq!(a, fingerprint("AAAA-BBBB"));
        let parsed: u32 = a.parse().unwrap();
        assert!(parsed < 1000);
    }

    #[test]
    fn oauth1_fingerprint_uses_the_consumer_key() {
        let header = r#"OAuth oauth_consumer_key="my_ck", oauth_signature="s1""#;
        let again = r#"OAuth oauth_consumer_key="my_ck", oauth_signature="s2""#;
        assert_eq!(
            classify(&headers_with(Some(header), None)).fingerprint,
            classify(&headers_with(Some(again), None)).fingerprint
        );
    }

    #[test]
    fn authorize_distinguishes_401_from_403() {
        let user_only = [SchemeKind::OAuth1, SchemeKind::OAuth2User];

        assert!(authorize(AuthMethod::OAuth1, Some(&user_only)).is_ok());
        assert!(authorize(AuthMethod::None, None).is_ok());

        match authorize(AuthMethod::None, Some(&user_only)) {
            Err(Error::Unauthorized) => {}
            other => panic!("expected 401, got {:?}", other),
        }
        match authorize(AuthMethod::Bearer, Some(&user_only)) {
            Err(Error::UnsupportedAuth) => {}
            other => panic!("expected 403, got {:?}", other),
        }
    }
}

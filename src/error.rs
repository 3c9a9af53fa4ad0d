// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A composite error type for everything that can reject a request, plus the
//! rendering into the two X-API error envelope families.
//!
//! The v2 service has two distinct error shapes on the wire: the
//! "problem" shape (`{title, type, status, detail}`) used for top-level
//! auth/rate-limit/ownership failures, and the batched shape
//! (`{errors: [...], title, detail, type}`) used for validation failures and
//! partial lookup errors. Every variant here knows which family it belongs
//! to; the dispatcher only ever calls [`Error::status`] and [`Error::body`].

use std::fmt;

use hyper::StatusCode;
use serde_json::{json, Map, Value};

/// Convenience wrapper around `std::result::Result`.
pub type Result<T> = std::result::Result<T, Error>;

/// Problem-type URL attached to validation envelopes.
pub const PROBLEM_INVALID_REQUEST: &str = "https://api.twitter.com/2/problems/invalid-request";
/// Problem-type URL attached to failed lookups.
pub const PROBLEM_NOT_FOUND: &str = "https://api.twitter.com/2/problems/resource-not-found";
/// Problem-type URL attached to scheme mismatches.
pub const PROBLEM_UNSUPPORTED_AUTH: &str =
    "https://api.twitter.com/2/problems/unsupported-authentication";
/// Problem-type URL for generic problem responses.
pub const PROBLEM_ABOUT_BLANK: &str = "about:blank";

/// Detail string the production service sends when an app-only token hits a
/// user-context endpoint. Byte-shape compatibility requires the exact text.
pub const UNSUPPORTED_AUTH_DETAIL: &str = "Authenticating with OAuth 2.0 Application-Only is \
     forbidden for this endpoint.  Supported authentication types are [OAuth 1.0a User Context, \
     OAuth 2.0 User Context].";

/// A single entry of the batched validation envelope.
///
/// `parameters` maps a parameter name to the invalid values the client sent;
/// `message` is the human-readable line the real service formats for it.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    pub parameters: Map<String, Value>,
    pub message: String,
}

impl ValidationError {
    /// An error naming one parameter and the values that failed for it.
    pub fn new(name: &str, values: Vec<String>, message: String) -> ValidationError {
        let mut parameters = Map::new();
        parameters.insert(name.to_string(), json!(values));
        ValidationError {
            parameters,
            message,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "parameters": Value::Object(self.parameters.clone()),
            "message": self.message,
        })
    }
}

/// The batch of validation errors a single request produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn push(&mut self, err: ValidationError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for e in &self.errors {
            if first {
                first = false;
            } else {
                write!(f, "; ")?;
            }
            write!(f, "{}", e.message)?;
        }
        Ok(())
    }
}

/// A failed entity lookup, rendered into the `resource-not-found` shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceError {
    /// Entity kind: `user`, `tweet`, `list`, `space`, `media`, ...
    pub resource_type: String,
    /// The id or username that missed.
    pub resource_id: String,
    /// The request parameter the id arrived in.
    pub parameter: String,
}

impl ResourceError {
    pub fn new(resource_type: &str, resource_id: &str, parameter: &str) -> ResourceError {
        ResourceError {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            parameter: parameter.to_string(),
        }
    }

    pub fn detail(&self) -> String {
        format!(
            "Could not find {} with {}: [{}].",
            self.resource_type, self.parameter, self.resource_id
        )
    }

    pub fn to_value(&self) -> Value {
        json!({
            "value": self.resource_id,
            "detail": self.detail(),
            "title": "Not Found Error",
            "resource_type": self.resource_type,
            "parameter": self.parameter,
            "resource_id": self.resource_id,
            "type": PROBLEM_NOT_FOUND,
        })
    }
}

/// A set of errors that can reject a request before or while serving it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The validator produced a non-empty batch.
    #[error("invalid request: {0}")]
    Validation(ValidationErrors),
    /// No credentials on an operation that requires them.
    #[error("missing authentication credentials")]
    Unauthorized,
    /// Credentials of the wrong scheme for the operation.
    #[error("unsupported authentication scheme")]
    UnsupportedAuth,
    /// An ownership rule rejected the caller.
    #[error("forbidden: {detail}")]
    Forbidden {
        /// Short problem title, e.g. `"Forbidden"`.
        title: &'static str,
        /// The fixed detail string for the specific rule.
        detail: String,
    },
    /// A hard failed lookup (DELETE of a nonexistent resource).
    #[error("resource not found: {0:?}")]
    NotFound(ResourceError),
    /// No operation in the API description matched the request path.
    #[error("no route for {0}")]
    RouteNotFound(String),
    /// The sliding window for the matched endpoint is full.
    #[error("rate limit exceeded")]
    RateLimited,
    /// The server-side deadline fired.
    #[error("request timed out")]
    Timeout,
    /// The request body exceeded the configured cap.
    #[error("request body larger than {0} bytes")]
    BodyTooLarge(usize),
    /// An error was experienced while reading the request stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The HTTP transport reported an error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
    /// A body failed to parse or serialize as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Anything else; surfaces as a 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status this error surfaces with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::UnsupportedAuth => StatusCode::FORBIDDEN,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::Timeout => StatusCode::REQUEST_TIMEOUT,
            Error::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Io(_) | Error::Http(_) | Error::Json(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The response body this error surfaces with, in the envelope family
    /// the production service uses for the same failure.
    pub fn body(&self) -> Value {
        match self {
            Error::Validation(batch) => {
                let errors: Vec<Value> = batch.errors.iter().map(|e| e.to_value()).collect();
                json!({
                    "errors": errors,
                    "title": "Invalid Request",
                    "detail": "One or more parameters to your request was invalid.",
                    "type": PROBLEM_INVALID_REQUEST,
                })
            }
            Error::Unauthorized => json!({
                "title": "Unauthorized",
                "type": PROBLEM_ABOUT_BLANK,
                "status": 401,
                "detail": "Unauthorized",
            }),
            Error::UnsupportedAuth => json!({
                "errors": [{
                    "parameters": {},
                    "message": UNSUPPORTED_AUTH_DETAIL,
                }],
                "title": "Unsupported Authentication",
                "detail": UNSUPPORTED_AUTH_DETAIL,
                "type": PROBLEM_UNSUPPORTED_AUTH,
                "status": 403,
            }),
            Error::Forbidden { title, detail } => json!({
                "detail": detail,
                "type": PROBLEM_ABOUT_BLANK,
                "title": title,
                "status": 403,
            }),
            Error::NotFound(resource) => json!({
                "errors": [resource.to_value()],
                "title": "Not Found Error",
                "detail": resource.detail(),
                "type": PROBLEM_NOT_FOUND,
                "status": 404,
            }),
            Error::RouteNotFound(path) => json!({
                "title": "Not Found Error",
                "type": PROBLEM_ABOUT_BLANK,
                "status": 404,
                "detail": format!("The requested resource {} was not found.", path),
            }),
            Error::RateLimited => json!({
                "title": "Too Many Requests",
                "type": PROBLEM_ABOUT_BLANK,
                "status": 429,
                "detail": "Too Many Requests",
            }),
            Error::Timeout => json!({
                "errors": [{
                    "message": "Request timeout",
                    "code": 408,
                }],
            }),
            Error::BodyTooLarge(cap) => json!({
                "title": "Payload Too Large",
                "type": PROBLEM_ABOUT_BLANK,
                "status": 413,
                "detail": format!("Request body may not exceed {} bytes.", cap),
            }),
            Error::Io(_) | Error::Http(_) | Error::Json(_) | Error::Internal(_) => json!({
                "title": "Internal Server Error",
                "type": PROBLEM_ABOUT_BLANK,
                "status": 500,
                "detail": "An unexpected error occurred. Please try again.",
            }),
        }
    }

    /// Helper for the list-ownership rule, which carries a fixed detail.
    pub fn not_list_owner() -> Error {
        Error::Forbidden {
            title: "Forbidden",
            detail: "You are not permitted to modify this List.".to_string(),
        }
    }

    /// Helper for the tweet-author rule.
    pub fn not_tweet_author() -> Error {
        Error::Forbidden {
            title: "Forbidden",
            detail: "You are not permitted to delete another user's Tweet.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_envelope_shape() {
        let mut batch = ValidationErrors::default();
        batch.push(ValidationError::new(
            "id",
            vec!["abc".to_string()],
            "The `id` query parameter value [abc] is not valid".to_string(),
        ));
        let err = Error::Validation(batch);

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = err.body();
        assert_eq!(body["title"], "Invalid Request");
        assert_eq!(body["type"], PROBLEM_INVALID_REQUEST);
        assert_eq!(body["errors"][0]["parameters"]["id"], json!(["abc"]));
    }

    #[test]
    fn not_found_detail_format() {
        let resource = ResourceError::new("user", "9999", "id");
        assert_eq!(resource.detail(), "Could not find user with id: [9999].");

        let err = Error::NotFound(resource);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.body()["errors"][0]["title"], "Not Found Error");
    }

    #[test]
    fn auth_envelopes() {
        assert_eq!(Error::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Unauthorized.body()["status"], json!(401));

        let err = Error::UnsupportedAuth;
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let body = err.body();
        assert_eq!(body["title"], "Unsupported Authentication");
        assert_eq!(body["errors"][0]["message"], UNSUPPORTED_AUTH_DETAIL);
    }

    #[test]
    fn timeout_uses_the_code_shape() {
        let body = Error::Timeout.body();
        assert_eq!(body["errors"][0]["code"], json!(408));
        assert_eq!(body["errors"][0]["message"], "Request timeout");
    }
}

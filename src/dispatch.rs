// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The dispatcher: the per-request pipeline that stitches every subsystem
//! together.
//!
//! Order matters and is fixed: CORS preflight, routing, rate limiting,
//! authentication, body reading, validation, error simulation, then the
//! actual work (streaming runtime, domain handler, canned example, or
//! schema generation), and finally the response shaper and headers. The
//! rate-limit header trio rides on every API response, including the
//! rejections, so clients can pace themselves even while being told no.

use std::sync::Arc;
use std::time::Duration;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use rand::Rng;
use serde_json::{json, Value};

use crate::auth;
use crate::canned::ExampleStore;
use crate::common::envelope::RateLimit;
use crate::common::{request_id, now_secs, Cancel, X_REQUEST_ID};
use crate::config::Config;
use crate::error::{Error, Result, ValidationError, ValidationErrors};
use crate::handler::{self, Ctx};
use crate::limit::RateLimiter;
use crate::links;
use crate::query::QueryParams;
use crate::shape;
use crate::spec::{normalize, ApiSpec};
use crate::store::Store;
use crate::stream::{self, StreamKind};
use crate::validate;

/// The embedded default API description.
const EMBEDDED_SPEC: &str = include_str!("../assets/openapi.json");
/// The placeholder page served at `/playground`.
const PLAYGROUND_HTML: &str = include_str!("../assets/playground.html");

/// The process-wide server record: every shared subsystem, built once.
pub struct Server {
    pub config: Config,
    pub spec: ApiSpec,
    pub store: Arc<Store>,
    pub limiter: RateLimiter,
    pub examples: ExampleStore,
    started_at: i64,
}

impl Server {
    /// Builds a server from configuration: loads the API description,
    /// seeds the store (importing seed state when configured), and wires
    /// the rate limiter to the configured override source.
    pub fn new(config: Config) -> Result<Server> {
        let spec = match &config.spec_path {
            Some(path) => ApiSpec::from_json(&std::fs::read_to_string(path)?)?,
            None => ApiSpec::from_json(EMBEDDED_SPEC)?,
        };
        let store = Arc::new(Store::seeded());
        if let Some(path) = &config.seed_path {
            let state: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            store.import_state(&state)?;
        }
        let examples = match &config.examples_dir {
            Some(dir) => ExampleStore::with_overlay(dir)?,
            None => ExampleStore::embedded(),
        };
        let limiter = RateLimiter::new(config.policy_source());
        Ok(Server {
            config,
            spec,
            store,
            limiter,
            examples,
            started_at: now_secs(),
        })
    }

    /// Serves one request. Never returns an Err: every failure is encoded
    /// as an X-API error envelope.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let request_id = request_id();

        if req.method() == Method::OPTIONS {
            return preflight(&request_id);
        }

        let path = normalize(req.uri().path());
        if let Some(response) = self.admin(&path, &request_id) {
            return response;
        }

        let credentials = auth::classify(req.headers());
        let method = req.method().as_str().to_uppercase();

        let resolved = match self.spec.resolve_operation(&method, &path) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::debug!(%method, %path, "no matching operation");
                return respond(err.status(), err.body(), None, &request_id);
            }
        };
        tracing::debug!(
            id = %request_id,
            method = %resolved.method,
            endpoint = resolved.pattern,
            credential = %credentials.fingerprint,
            "dispatching"
        );

        // rate limiting before anything else that costs work
        let decision = self.limiter.check(
            &credentials.fingerprint,
            &resolved.method,
            resolved.pattern,
            &path,
            now_secs(),
        );
        let rate = Some(decision.rate);
        if !decision.allowed {
            tracing::debug!("rate limited");
            let err = Error::RateLimited;
            return respond(err.status(), err.body(), rate, &request_id);
        }

        // authentication
        if self.config.validate_auth {
            let accepted = self.spec.accepted_schemes(resolved.operation);
            if let Err(err) = auth::authorize(credentials.method, accepted.as_deref()) {
                tracing::debug!(scheme = credentials.method.label(), "authentication rejected");
                return respond(err.status(), err.body(), rate, &request_id);
            }
        }

        // streaming endpoints bypass the body/validator/deadline path
        if self.spec.is_streaming(resolved.pattern, resolved.operation) {
            let query = QueryParams::parse(req.uri().query());
            if let Err(err) =
                validate::validate(&self.spec, &self.store, &resolved, &query, None)
            {
                return respond(err.status(), err.body(), rate, &request_id);
            }
            if let Some(err) = self.simulated_error() {
                return respond(err.status(), err.body(), rate, &request_id);
            }
            let kind = match StreamKind::for_pattern(resolved.pattern) {
                Some(kind) => kind,
                None => {
                    // the document declares a stream this build does not carry
                    let err = Error::Internal(format!(
                        "no streaming runtime for {}",
                        resolved.pattern
                    ));
                    return respond(err.status(), err.body(), rate, &request_id);
                }
            };
            let cancel = Cancel::new();
            let body = stream::open(
                Arc::clone(&self.store),
                &self.config,
                kind,
                &credentials.fingerprint,
                cancel,
            );
            self.store.record_usage(&credentials.fingerprint, 1);
            let mut response = Response::new(body);
            write_common_headers(response.headers_mut(), rate, &request_id);
            return response;
        }

        // unary: read the body, validate, dispatch, shape — under the
        // request deadline
        let deadline = Duration::from_secs(self.config.request_deadline_secs);
        let cancel = Cancel::new();
        let work = self.unary(req, &resolved, &credentials.fingerprint, &cancel);
        let (status, body) = match tokio::time::timeout(deadline, work).await {
            Ok(done) => done,
            Err(_) => {
                cancel.cancel();
                let err = Error::Timeout;
                (err.status(), err.body())
            }
        };

        self.store.record_usage(&credentials.fingerprint, 1);
        respond(status, body, rate, &request_id)
    }

    /// The unary pipeline tail: body, validation, simulation, handler or
    /// fallback, shaping.
    async fn unary(
        &self,
        req: Request<Body>,
        resolved: &crate::spec::ResolvedOperation<'_>,
        fingerprint: &str,
        cancel: &Cancel,
    ) -> (StatusCode, Value) {
        let query = QueryParams::parse(req.uri().query());

        let body = match read_body(req, self.config.body_limit).await {
            Ok(body) => body,
            Err(err) => return (err.status(), err.body()),
        };

        if let Err(err) = validate::validate(&self.spec, &self.store, resolved, &query, body.as_ref())
        {
            return (err.status(), err.body());
        }

        if let Some(err) = self.simulated_error() {
            tracing::debug!("substituting simulated error");
            return (err.status(), err.body());
        }

        if let Some(handler) = handler::route(&resolved.method, resolved.pattern) {
            let ctx = Ctx {
                store: &self.store,
                spec: &self.spec,
                resolved,
                query: &query,
                body: body.as_ref(),
                actor: fingerprint,
                cancel,
            };
            return match handler(&ctx) {
                Ok(outcome) => shape::shape(&self.store, &query, outcome),
                Err(err) => (err.status(), err.body()),
            };
        }

        if let Some(example) = self.examples.lookup(&resolved.method, resolved.pattern) {
            return (StatusCode::OK, example.clone());
        }

        let schema = resolved
            .operation
            .success_response()
            .and_then(|def| def.schema.as_ref());
        (
            StatusCode::OK,
            crate::generate::response_for(&self.spec, schema),
        )
    }

    /// The diagnostics endpoints outside `/2`.
    fn admin(&self, path: &str, request_id: &str) -> Option<Response<Body>> {
        match path {
            p if p == links::admin::HEALTH => {
                let mut counts = serde_json::Map::new();
                for (name, count) in self.store.census() {
                    counts.insert(name.to_string(), json!(count));
                }
                let body = json!({
                    "status": "ok",
                    "uptime_secs": now_secs() - self.started_at,
                    "entities": counts,
                    "streaming_connections": self.store.connection_count(),
                });
                Some(respond(StatusCode::OK, body, None, request_id))
            }
            p if p == links::admin::RATE_LIMITS => {
                let body = json!({
                    "counters": self.limiter.snapshot(now_secs()),
                });
                Some(respond(StatusCode::OK, body, None, request_id))
            }
            p if p == links::admin::PLAYGROUND => {
                let mut response = Response::new(Body::from(PLAYGROUND_HTML));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                write_cors(response.headers_mut());
                if let Ok(value) = HeaderValue::from_str(request_id) {
                    response.headers_mut().insert(X_REQUEST_ID, value);
                }
                Some(response)
            }
            _ => None,
        }
    }

    /// Rolls the error-simulation dice.
    fn simulated_error(&self) -> Option<Error> {
        let simulation = self.config.error_simulation.as_ref()?;
        if simulation.kinds.is_empty() {
            return None;
        }
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() >= simulation.rate {
            return None;
        }
        let kind = simulation.kinds[rng.gen_range(0..simulation.kinds.len())];
        Some(kind.to_error())
    }
}

/// Reads and parses the request body under the configured cap. An empty
/// body is `None`; anything non-empty must be JSON.
async fn read_body(req: Request<Body>, limit: usize) -> Result<Option<Value>> {
    if let Some(length) = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > limit {
            return Err(Error::BodyTooLarge(limit));
        }
    }
    let bytes = hyper::body::to_bytes(req.into_body()).await?;
    if bytes.len() > limit {
        return Err(Error::BodyTooLarge(limit));
    }
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes).map(Some).map_err(|_| {
        let mut batch = ValidationErrors::default();
        batch.push(ValidationError::new(
            "body",
            Vec::new(),
            "The request body is not valid JSON".to_string(),
        ));
        Error::Validation(batch)
    })
}

fn preflight(request_id: &str) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    write_cors(response.headers_mut());
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

fn write_cors(headers: &mut hyper::HeaderMap) {
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Authorization, Content-Type, X-Auth-Method"),
    );
}

fn write_common_headers(
    headers: &mut hyper::HeaderMap,
    rate: Option<RateLimit>,
    request_id: &str,
) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    write_cors(headers);
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, value);
    }
    if let Some(rate) = rate {
        rate.write_headers(headers);
    }
}

/// Assembles the final response.
fn respond(
    status: StatusCode,
    body: Value,
    rate: Option<RateLimit>,
    request_id: &str,
) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    write_common_headers(response.headers_mut(), rate, request_id);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET};
    use crate::limit::PolicyOverride;
    use hyper::header::AUTHORIZATION;

    fn server() -> Arc<Server> {
        Arc::new(Server::new(Config::default()).unwrap())
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, "Bearer test")
            .body(Body::empty())
            .unwrap()
    }

    fn request_with_body(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, "Bearer test")
            .header(crate::common::X_AUTH_METHOD, "oauth2user")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn users_me_serves_the_default_account() {
        let server = server();
        let response = server.handle(request("GET", "/2/users/me")).await;
        assert_eq!(response.status(), StatusCode::OK);

        for header in &[X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET] {
            assert!(response.headers().contains_key(*header), "missing {}", header);
        }
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert!(response.headers().contains_key("access-control-allow-origin"));

        let body = body_json(response).await;
        assert_eq!(body["data"]["id"], "0");
        assert_eq!(body["data"]["username"], "mockingbird");
        assert!(body["data"]["name"].is_string());
    }

    #[tokio::test]
    async fn created_tweets_are_visible_to_lookups() {
        let server = server();
        let response = server
            .handle(request_with_body("POST", "/2/tweets", json!({"text": "hi"})))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["text"], "hi");
        assert_eq!(body["data"]["edit_history_tweet_ids"], json!([id.clone()]));

        let response = server
            .handle(request("GET", &format!("/2/tweets/{}", id)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["id"], json!(id));
        assert_eq!(body["data"]["text"], "hi");
    }

    #[tokio::test]
    async fn follows_are_idempotent_with_the_fixed_envelope() {
        let server = server();
        for _ in 0..2 {
            let response = server
                .handle(request_with_body(
                    "POST",
                    "/2/users/0/following",
                    json!({"target_user_id": "1"}),
                ))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(
                body["data"],
                json!({"following": true, "pending_follow": false})
            );
        }

        let response = server.handle(request("GET", "/2/users/0/following")).await;
        let body = body_json(response).await;
        let hits: Vec<&Value> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|u| u["id"] == "1")
            .collect();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn personalized_trends_does_not_hit_the_username_template() {
        let server = server();
        let response = server
            .handle(request("GET", "/2/users/personalized_trends"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let first = &body["data"][0];
        assert!(first["trend_name"].is_string());
        assert!(first["post_count"].is_number());
    }

    #[tokio::test]
    async fn invalid_ids_produce_the_grouped_validation_envelope() {
        let server = server();
        let response = server.handle(request("GET", "/2/tweets?ids=abc,123")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Invalid Request");
        assert_eq!(body["errors"][0]["parameters"]["id"], json!(["abc"]));
        assert!(body["errors"][0]["message"]
            .as_str()
            .unwrap()
            .starts_with("The `id` query parameter value"));
    }

    #[tokio::test]
    async fn rate_limits_count_down_then_reject() {
        let mut config = Config::default();
        config.rate_overrides = vec![PolicyOverride {
            method: Some("GET".to_string()),
            endpoint: "/2/users/me".to_string(),
            limit: 3,
            window_secs: 900,
        }];
        let server = Arc::new(Server::new(config).unwrap());

        let mut remaining_seen = Vec::new();
        for _ in 0..3 {
            let response = server.handle(request("GET", "/2/users/me")).await;
            assert_eq!(response.status(), StatusCode::OK);
            remaining_seen.push(
                response.headers()[X_RATE_LIMIT_REMAINING]
                    .to_str()
                    .unwrap()
                    .parse::<i64>()
                    .unwrap(),
            );
        }
        assert_eq!(remaining_seen, vec![2, 1, 0]);

        let response = server.handle(request("GET", "/2/users/me")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[X_RATE_LIMIT_REMAINING], "0");
        let body = body_json(response).await;
        assert_eq!(body["title"], "Too Many Requests");
        assert_eq!(body["status"], 429);
    }

    #[tokio::test]
    async fn auth_failures_distinguish_401_from_403() {
        let server = server();

        // no credentials on a secured endpoint
        let response = server
            .handle(
                Request::builder()
                    .method("GET")
                    .uri("/2/users/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Unauthorized");

        // app-only bearer on a user-context-only endpoint
        let response = server
            .handle(
                Request::builder()
                    .method("POST")
                    .uri("/2/tweets")
                    .header(AUTHORIZATION, "Bearer test")
                    .body(Body::from(json!({"text": "hi"}).to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Unsupported Authentication");
    }

    #[tokio::test]
    async fn connections_all_reports_the_attempt() {
        let server = server();
        let response = server
            .handle(request("DELETE", "/2/connections/all"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body, json!({"data": {"attempted": true}}));
    }

    #[tokio::test]
    async fn unknown_routes_are_404() {
        let server = server();
        let response = server.handle(request("GET", "/2/nonsense")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn canned_examples_serve_unhandled_operations() {
        let server = server();
        let response = server
            .handle(request("GET", "/2/notes/search/notes_written"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body.get("data").is_some());
    }

    #[tokio::test]
    async fn health_and_rate_limit_diagnostics() {
        let server = server();
        server.handle(request("GET", "/2/users/me")).await;

        let response = server.handle(request("GET", "/health")).await;
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["entities"]["users"].as_u64().unwrap() >= 4);

        let response = server.handle(request("GET", "/rate-limits")).await;
        let body = body_json(response).await;
        let counters = body["counters"].as_array().unwrap();
        assert!(counters
            .iter()
            .any(|c| c["endpoint"] == "/2/users/me" && c["credential"] == "0"));
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let server = server();
        let response = server.handle(request("OPTIONS", "/2/tweets")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let mut config = Config::default();
        config.body_limit = 64;
        let server = Arc::new(Server::new(config).unwrap());
        let big = "x".repeat(200);
        let response = server
            .handle(request_with_body("POST", "/2/tweets", json!({ "text": big })))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn malformed_json_bodies_fail_validation() {
        let server = server();
        let response = server
            .handle(
                Request::builder()
                    .method("POST")
                    .uri("/2/tweets")
                    .header(AUTHORIZATION, "Bearer test")
                    .header(crate::common::X_AUTH_METHOD, "oauth2user")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["errors"][0]["message"],
            "The request body is not valid JSON"
        );
    }

    #[tokio::test]
    async fn simulated_errors_replace_the_real_response() {
        let mut config = Config::default();
        config.error_simulation = Some(crate::config::ErrorSimulation {
            rate: 1.0,
            kinds: vec![crate::config::SimulatedError::Internal],
        });
        let server = Arc::new(Server::new(config).unwrap());
        let response = server.handle(request("GET", "/2/users/me")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // headers still reflect the real rate-limit counter
        assert!(response.headers().contains_key(X_RATE_LIMIT_REMAINING));
    }

    #[tokio::test]
    async fn streaming_endpoint_returns_a_live_body() {
        use futures::StreamExt;
        let mut config = Config::default();
        config.stream_delay_ms = 10;
        let server = Arc::new(Server::new(config).unwrap());

        let response = server
            .handle(request("GET", "/2/tweets/sample/stream"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.store.connection_count(), 1);

        let mut body = response.into_body();
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!chunk.is_empty());

        server.store.close_all_connections();
    }
}
